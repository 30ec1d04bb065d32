//! 查看模式: 读取上传的体数据, 渲染指定切片并保存为 PNG.
//!
//! 分割网络由外部框架提供, 这里不载入模型, 分割图为占位图.

use std::path::{Path, PathBuf};
use tumor_berry::error::ConfigError;
use tumor_berry::prelude::*;
use tumor_berry::viewer::legend;

/// 上传文件环境变量.
pub const UPLOAD_ENV: &str = "TUMOR_BERRY_UPLOAD";

/// 切片编号环境变量, 从 1 开始.
pub const SLICE_ENV: &str = "TUMOR_BERRY_SLICE";

/// 输出目录环境变量.
pub const PREVIEW_DIR_ENV: &str = "TUMOR_BERRY_PREVIEW_DIR";

/// 渲染 `upload` 的第 `slice` 张切片, 保存到 `out`.
pub fn preview(
    session: &mut ViewerSession,
    upload: &Path,
    slice: usize,
    out: &Path,
) -> Result<(PathBuf, PathBuf)> {
    let pair = session.make_segmentation(Some(upload), slice)?;
    std::fs::create_dir_all(out)?;
    pair.save(out, &format!("slice_{slice:03}"))
}

/// 实际运行.
pub fn run() -> Result<()> {
    let upload: PathBuf = crate::parse_var::<String>(UPLOAD_ENV)?
        .map(PathBuf::from)
        .ok_or_else(|| ConfigError::Missing(UPLOAD_ENV.to_string()))?;
    let slice = crate::parse_var(SLICE_ENV)?.unwrap_or(1);
    let out = crate::dir_var_or(PREVIEW_DIR_ENV, "preview");

    let mut session = ViewerSession::new(PipelineConfig::default())?;
    for (name, [r, g, b]) in legend() {
        log::info!("#{r:02x}{g:02x}{b:02x} {name}");
    }
    crate::sep();
    let (image, segmentation) = preview(&mut session, &upload, slice, &out)?;
    log::info!(
        "slice {slice}/{} saved to `{}` and `{}`",
        session.depth(),
        image.display(),
        segmentation.display()
    );
    Ok(())
}
