//! epoch 驱动.

use super::{BestCheckpoint, EpochLosses, LossFn, ModelAdapter, SegmentationNetwork};
use crate::config::TrainConfig;
use crate::data::VolumeSource;
use crate::dataset::SplitDatasets;
use crate::error::{Result, ValidationError};
use std::path::PathBuf;

/// 一次训练的结果.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitSummary {
    /// 每个 epoch 的逐批损失.
    pub epochs: Vec<EpochLosses>,

    /// 最小平均验证损失.
    pub best_val_loss: Option<f64>,

    /// 最优权重路径. 从未保存时为 `None`.
    pub checkpoint: Option<PathBuf>,
}

/// 训练 `config.max_epochs` 个 epoch.
///
/// 每个 epoch 先按随机顺序遍历训练集并逐批优化, 再按固定顺序遍历验证集.
/// 平均验证损失下降时把权重保存到 `config.checkpoint_dir`.
/// 任何一批加载或计算失败都会中止训练并返回 `Err`.
pub fn fit<S, N, L>(
    adapter: &mut ModelAdapter<N, L>,
    sets: &SplitDatasets<S>,
    config: &TrainConfig,
) -> Result<FitSummary>
where
    S: VolumeSource,
    N: SegmentationNetwork,
    L: LossFn,
{
    if config.max_epochs == 0 {
        return Err(ValidationError::Parameter {
            name: "max_epochs",
            reason: "必须大于 0".to_string(),
        }
        .into());
    }
    let mut checkpoint = BestCheckpoint::new(&config.checkpoint_dir);
    let mut summary = FitSummary::default();

    for epoch in 0..config.max_epochs {
        let seed = config.shuffle_seed.map(|s| s.wrapping_add(epoch as u64));
        for (i, batch) in sets.train_loader(&config.loader, seed)?.enumerate() {
            adapter.training_step(&batch?, i)?;
        }
        for (i, batch) in sets.val_loader(&config.loader)?.enumerate() {
            adapter.validation_step(&batch?, i)?;
        }

        let losses = adapter.end_epoch();
        let (train_loss, val_loss) = (losses.train_loss(), losses.val_loss());
        log::info!(
            "epoch {}/{}: train_loss = {:?}, val_loss = {:?}",
            epoch + 1,
            config.max_epochs,
            train_loss,
            val_loss
        );
        if let Some(v) = val_loss {
            checkpoint.update(adapter.network(), v)?;
        }
        summary.epochs.push(losses);
    }

    summary.best_val_loss = checkpoint.best();
    summary.checkpoint = checkpoint.saved().map(PathBuf::from);
    Ok(summary)
}
