use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::process::ExitCode;
use tumor_berry::config::RunMode;

fn main() -> ExitCode {
    if let Err(e) = SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("cannot install logger: {e}");
    }

    let result = RunMode::from_env().and_then(|mode| {
        log::info!("running in {mode:?} mode");
        match mode {
            RunMode::Train => runner::export::run(),
            RunMode::Serve => runner::preview::run(),
        }
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
