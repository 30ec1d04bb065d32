use super::SegmentationNetwork;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// 监控验证损失, 损失下降时保存网络权重.
///
/// 权重保存于 `{dir}/{架构名}.ckpt`, 每次改进都会覆盖上一次的文件.
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    dir: PathBuf,
    best: Option<f64>,
    saved: Option<PathBuf>,
}

impl BestCheckpoint {
    /// 在 `dir` 下保存. 目录在第一次保存时才创建.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            best: None,
            saved: None,
        }
    }

    /// 某个架构的权重路径.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.ckpt"))
    }

    /// 迄今最小的验证损失.
    #[inline]
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// 最近一次保存的路径.
    #[inline]
    pub fn saved(&self) -> Option<&Path> {
        self.saved.as_deref()
    }

    /// 报告一次验证损失. 严格小于迄今最优时保存并返回 `true`.
    ///
    /// 非有限的损失不会被视为改进.
    pub fn update<N: SegmentationNetwork + ?Sized>(&mut self, network: &N, val_loss: f64) -> Result<bool> {
        if !val_loss.is_finite() || self.best.is_some_and(|b| val_loss >= b) {
            return Ok(false);
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(network.name());
        network.save_weights(&path)?;
        log::info!("val_loss improved to {val_loss:.6}, saved `{}`", path.display());
        self.best = Some(val_loss);
        self.saved = Some(path);
        Ok(true)
    }
}
