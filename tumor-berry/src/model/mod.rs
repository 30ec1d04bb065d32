//! 分割模型接口与训练包装.
//!
//! 网络本身 (SegResNet, UNETR 等) 由外部框架实现, 本模块只约定它们的能力:
//! 前向推理, 训练/推理模式切换, 优化器步进和权重保存.

use crate::dataset::Batch;
use crate::error::Result;
use ndarray::{Array5, ArrayView5};
use std::path::Path;

mod checkpoint;
pub mod ensemble;
pub mod loss;
mod trainer;

pub use checkpoint::BestCheckpoint;
pub use ensemble::Ensemble;
pub use loss::{DiceLoss, LossFn};
pub use trainer::{fit, FitSummary};

/// 能对 `(B, c, H, W, D)` 输入给出 `(B, num_classes, H, W, D)` 输出的模型.
pub trait Segmenter: Send + Sync {
    /// 前向推理.
    fn forward(&self, inputs: ArrayView5<f32>) -> Result<Array5<f32>>;

    /// 切换训练 (`true`) 或推理 (`false`) 模式.
    fn set_training(&mut self, training: bool);
}

/// 可训练的分割网络.
pub trait SegmentationNetwork: Segmenter {
    /// 架构名, 用作权重文件名.
    fn name(&self) -> &str;

    /// 以当前批的损失执行一步优化. 反向传播由网络自身负责.
    fn optimizer_step(&mut self, optimizer: &AdamW, loss: f64) -> Result<()>;

    /// 保存权重.
    fn save_weights(&self, path: &Path) -> Result<()>;
}

/// AdamW 优化器超参数.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamW {
    /// 学习率.
    pub learning_rate: f64,

    /// 一阶, 二阶矩衰减率.
    pub betas: (f64, f64),

    /// 数值稳定项.
    pub eps: f64,

    /// 权重衰减.
    pub weight_decay: f64,
}

impl Default for AdamW {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            betas: (0.9, 0.999),
            eps: 1e-8,
            weight_decay: 1e-2,
        }
    }
}

/// 一个 epoch 内记录的逐批损失.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochLosses {
    /// 训练损失.
    pub train: Vec<f64>,

    /// 验证损失.
    pub validation: Vec<f64>,
}

impl EpochLosses {
    fn mean(v: &[f64]) -> Option<f64> {
        (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64)
    }

    /// 平均训练损失.
    #[inline]
    pub fn train_loss(&self) -> Option<f64> {
        Self::mean(&self.train)
    }

    /// 平均验证损失.
    #[inline]
    pub fn val_loss(&self) -> Option<f64> {
        Self::mean(&self.validation)
    }
}

/// 把网络和损失函数包装成可训练的单元.
pub struct ModelAdapter<N, L = DiceLoss> {
    network: N,
    loss_fn: L,
    learning_rate: f64,
    losses: EpochLosses,
}

impl<N: SegmentationNetwork, L: LossFn> ModelAdapter<N, L> {
    /// 使用默认学习率 `1e-3` 包装.
    pub fn new(network: N, loss_fn: L) -> Self {
        Self::with_learning_rate(network, loss_fn, AdamW::default().learning_rate)
    }

    /// 指定学习率包装.
    pub fn with_learning_rate(network: N, loss_fn: L, learning_rate: f64) -> Self {
        Self {
            network,
            loss_fn,
            learning_rate,
            losses: EpochLosses::default(),
        }
    }

    /// 内部网络.
    #[inline]
    pub fn network(&self) -> &N {
        &self.network
    }

    /// 取出内部网络.
    #[inline]
    pub fn into_network(self) -> N {
        self.network
    }

    /// 学习率.
    #[inline]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// 前向推理.
    #[inline]
    pub fn forward(&self, inputs: ArrayView5<f32>) -> Result<Array5<f32>> {
        self.network.forward(inputs)
    }

    fn common_step(&self, batch: &Batch) -> Result<f64> {
        let preds = self.forward(batch.inputs.view())?;
        Ok(self.loss_fn.loss(preds.view(), batch.targets.view())?)
    }

    /// 训练一批: 前向, 计算损失, 再执行一步优化.
    pub fn training_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<f64> {
        self.network.set_training(true);
        let loss = self.common_step(batch)?;
        let optimizer = self.configure_optimizer();
        self.network.optimizer_step(&optimizer, loss)?;
        log::debug!("batch {batch_idx}: train_loss = {loss:.6}");
        self.losses.train.push(loss);
        Ok(loss)
    }

    /// 验证一批, 只前向和计算损失.
    pub fn validation_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<f64> {
        self.network.set_training(false);
        let loss = self.common_step(batch)?;
        log::debug!("batch {batch_idx}: val_loss = {loss:.6}");
        self.losses.validation.push(loss);
        Ok(loss)
    }

    /// 固定学习率的 AdamW.
    pub fn configure_optimizer(&self) -> AdamW {
        AdamW {
            learning_rate: self.learning_rate,
            ..Default::default()
        }
    }

    /// 结束当前 epoch, 取出并清空本 epoch 的损失.
    pub fn end_epoch(&mut self) -> EpochLosses {
        std::mem::take(&mut self.losses)
    }
}

impl<N: SegmentationNetwork, L: LossFn> Segmenter for ModelAdapter<N, L> {
    #[inline]
    fn forward(&self, inputs: ArrayView5<f32>) -> Result<Array5<f32>> {
        self.network.forward(inputs)
    }

    #[inline]
    fn set_training(&mut self, training: bool) {
        self.network.set_training(training)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ShapeError;
    use ndarray::Axis;
    use std::fs;

    /// 每个体素都输出同一组类别得分的网络.
    pub(crate) struct ConstantNet {
        pub(crate) name: String,
        pub(crate) scores: Vec<f32>,
        pub(crate) training: bool,
        pub(crate) steps: Vec<(f64, f64)>,
    }

    impl ConstantNet {
        pub(crate) fn new(name: &str, scores: Vec<f32>) -> Self {
            Self {
                name: name.to_string(),
                scores,
                training: true,
                steps: Vec::new(),
            }
        }
    }

    impl Segmenter for ConstantNet {
        fn forward(&self, inputs: ArrayView5<f32>) -> Result<Array5<f32>> {
            if inputs.is_empty() {
                return Err(ShapeError::Empty.into());
            }
            let (b, _, h, w, d) = inputs.dim();
            Ok(Array5::from_shape_fn(
                (b, self.scores.len(), h, w, d),
                |(_, c, _, _, _)| self.scores[c],
            ))
        }

        fn set_training(&mut self, training: bool) {
            self.training = training;
        }
    }

    impl SegmentationNetwork for ConstantNet {
        fn name(&self) -> &str {
            &self.name
        }

        fn optimizer_step(&mut self, optimizer: &AdamW, loss: f64) -> Result<()> {
            self.steps.push((optimizer.learning_rate, loss));
            Ok(())
        }

        fn save_weights(&self, path: &Path) -> Result<()> {
            let text: Vec<String> = self.scores.iter().map(f32::to_string).collect();
            fs::write(path, text.join(","))?;
            Ok(())
        }
    }

    /// 两个类别各占一半体素.
    pub(crate) fn half_batch() -> Batch {
        let targets = Array5::from_shape_fn((1, 2, 2, 2, 2), |(_, c, i, _, _)| (c == i) as u8 as f32);
        Batch {
            ids: vec!["a".to_string()],
            inputs: Array5::zeros((1, 4, 2, 2, 2)),
            targets,
        }
    }

    #[test]
    fn test_steps_and_losses() {
        let net = ConstantNet::new("SegResNet", vec![0.0, 0.0]);
        let mut adapter = ModelAdapter::new(net, DiceLoss::with_softmax());
        assert_eq!(adapter.configure_optimizer().learning_rate, 1e-3);

        let b = half_batch();
        let loss = adapter.training_step(&b, 0).unwrap();
        assert!((loss - 0.5).abs() < 1e-4);
        assert!(adapter.network().training);
        assert_eq!(adapter.network().steps, vec![(1e-3, loss)]);

        adapter.validation_step(&b, 0).unwrap();
        adapter.validation_step(&b, 1).unwrap();
        assert!(!adapter.network().training);
        // 验证不触发优化.
        assert_eq!(adapter.network().steps.len(), 1);

        let epoch = adapter.end_epoch();
        assert_eq!(epoch.train.len(), 1);
        assert_eq!(epoch.validation.len(), 2);
        assert!((epoch.val_loss().unwrap() - 0.5).abs() < 1e-4);
        assert_eq!(adapter.end_epoch(), EpochLosses::default());
        assert_eq!(EpochLosses::default().train_loss(), None);
    }

    #[test]
    fn test_forward_shape() {
        let net = ConstantNet::new("UNETR", vec![1.0, 2.0, 3.0]);
        let adapter = ModelAdapter::new(net, DiceLoss::default());
        let out = adapter.forward(Array5::zeros((2, 4, 3, 3, 3)).view()).unwrap();
        assert_eq!(out.dim(), (2, 3, 3, 3, 3));
        assert_eq!(out.index_axis(Axis(1), 2).sum(), 3.0 * 54.0);
    }
}
