use super::generic::Dataset;
use super::loader::{DataLoader, Order};
use super::split::{Split, Stage};
use crate::config::{LoaderConfig, PipelineConfig, SplitConfig};
use crate::data::{Resampler, VolumeSource};
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// 数据模块: 负责列举样本, 划分数据集, 并为每个阶段提供数据集.
///
/// 样本 id 在第一次需要时才从数据源列举, 且只列举一次.
/// 划分同样只进行一次, 之后在整个运行期间保持不变.
pub struct DataModule<S> {
    source: Arc<S>,
    resampler: Arc<Resampler>,
    ids: OnceCell<Vec<String>>,
    split: OnceCell<Split>,
}

impl<S: VolumeSource> DataModule<S> {
    /// 创建数据模块. `config` 不合法时返回 `Err`.
    pub fn new(source: S, config: PipelineConfig) -> Result<Self> {
        Ok(Self {
            source: Arc::new(source),
            resampler: Arc::new(Resampler::new(config)?),
            ids: OnceCell::new(),
            split: OnceCell::new(),
        })
    }

    /// 重采样器.
    #[inline]
    pub fn resampler(&self) -> &Resampler {
        &self.resampler
    }

    /// 数据源.
    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// 全部样本 id.
    pub fn sample_ids(&self) -> Result<&[String]> {
        self.ids
            .get_or_try_init(|| {
                let ids = self.source.sample_ids()?;
                log::info!("found {} samples", ids.len());
                Ok::<_, Error>(ids)
            })
            .map(Vec::as_slice)
    }

    /// 样本划分. 第一次调用时按 `config` 划分, 之后的调用忽略 `config`, 返回同一划分.
    pub fn split(&self, config: &SplitConfig) -> Result<&Split> {
        if let Some(split) = self.split.get() {
            log::debug!("reusing the existing split");
            return Ok(split);
        }
        self.split
            .get_or_try_init(|| Split::new(self.sample_ids()?, config))
    }

    /// 划分数据集并构建三个阶段的数据集.
    pub fn setup(&self, config: &SplitConfig) -> Result<SplitDatasets<S>> {
        let split = self.split(config)?.clone();
        let dataset = |stage: Stage| {
            Dataset::new(
                Arc::clone(&self.source),
                Arc::clone(&self.resampler),
                split.get(stage).to_vec(),
            )
        };
        let (train, validation, test) = (
            dataset(Stage::Train),
            dataset(Stage::Validation),
            dataset(Stage::Test),
        );
        Ok(SplitDatasets {
            split,
            train,
            validation,
            test,
        })
    }
}

/// 划分后的三个数据集.
pub struct SplitDatasets<S> {
    /// 划分本身.
    pub split: Split,

    /// 训练集.
    pub train: Dataset<S>,

    /// 验证集.
    pub validation: Dataset<S>,

    /// 测试集.
    pub test: Dataset<S>,
}

impl<S: VolumeSource> SplitDatasets<S> {
    /// 按阶段获取数据集.
    #[inline]
    pub fn get(&self, stage: Stage) -> &Dataset<S> {
        match stage {
            Stage::Train => &self.train,
            Stage::Validation => &self.validation,
            Stage::Test => &self.test,
        }
    }

    /// 训练集加载器, 随机顺序.
    pub fn train_loader(&self, config: &LoaderConfig, seed: Option<u64>) -> Result<DataLoader<'_, S>> {
        self.train.loader(config, Order::Shuffled(seed))
    }

    /// 验证集加载器, 固定顺序.
    pub fn val_loader(&self, config: &LoaderConfig) -> Result<DataLoader<'_, S>> {
        self.validation.loader(config, Order::Sequential)
    }

    /// 测试集加载器, 固定顺序.
    pub fn test_loader(&self, config: &LoaderConfig) -> Result<DataLoader<'_, S>> {
        self.test.loader(config, Order::Sequential)
    }
}
