//! 通用 MRI 数据集: 按索引惰性加载并重采样样本.

use super::loader::{DataLoader, Order};
use crate::config::LoaderConfig;
use crate::data::{Resampler, TensorPair, VolumeSource};
use crate::error::{Result, ValidationError};
use std::sync::Arc;

/// 某一阶段的数据集.
///
/// 只持有 id 列表, 样本在 [`Dataset::get`] 时才从数据源加载, 不做任何缓存.
pub struct Dataset<S> {
    source: Arc<S>,
    resampler: Arc<Resampler>,
    ids: Vec<String>,
}

impl<S> Clone for Dataset<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            resampler: Arc::clone(&self.resampler),
            ids: self.ids.clone(),
        }
    }
}

impl<S: VolumeSource> Dataset<S> {
    /// 从共享的数据源和重采样器创建.
    pub fn new(source: Arc<S>, resampler: Arc<Resampler>, ids: Vec<String>) -> Self {
        Self {
            source,
            resampler,
            ids,
        }
    }

    /// 样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 样本 id 列表.
    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// 重采样器.
    #[inline]
    pub fn resampler(&self) -> &Resampler {
        &self.resampler
    }

    /// 加载并重采样第 `index` 个样本.
    ///
    /// 该方法无共享可变状态, 可在多个线程上并发调用.
    pub fn get(&self, index: usize) -> Result<TensorPair> {
        let id = self
            .ids
            .get(index)
            .ok_or(ValidationError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;
        self.fetch(id)
    }

    /// 加载并重采样样本 `id`.
    pub fn fetch(&self, id: &str) -> Result<TensorPair> {
        let data = self.source.fetch(id)?;
        self.resampler.resample(&data)
    }

    /// 创建批加载器.
    pub fn loader(&self, config: &LoaderConfig, order: Order) -> Result<DataLoader<'_, S>> {
        DataLoader::new(self, config, order)
    }
}
