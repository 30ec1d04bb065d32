//! 命令行入口依赖的通用组件.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tumor_berry::error::{ConfigError, Result};

pub mod export;
pub mod preview;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    log::info!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 读取并解析环境变量 `key`. 未设置或为空时返回 `None`, 无法解析时返回 `Err`.
pub fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => v.trim().parse().map(Some).map_err(|_| {
            ConfigError::Invalid {
                key: key.to_string(),
                value: v,
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

/// 读取路径环境变量 `key`, 未设置时使用 `default`.
pub fn dir_var_or(key: &str, default: &str) -> PathBuf {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(default), PathBuf::from)
}
