//! 批数据加载器.
//!
//! 提供迭代器风格的批获取模式. 每次 `next` 才真正加载该批的样本.

use super::generic::Dataset;
use crate::config::LoaderConfig;
use crate::data::{TensorPair, VolumeSource};
use crate::error::{Result, ShapeError, ValidationError};
use ndarray::{Array5, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 样本的迭代顺序.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Order {
    /// 固定顺序. 用于验证集和测试集.
    Sequential,

    /// 随机顺序. 用于训练集. `None` 时从系统熵源取种子.
    Shuffled(Option<u64>),
}

/// 一批张量, 沿第 0 轴堆叠.
///
/// `inputs` 形状为 `(B, c, H, W, D)`, `targets` 形状为 `(B, num_classes, H, W, D)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 样本 id, 与第 0 轴一一对应.
    pub ids: Vec<String>,

    /// 输入.
    pub inputs: Array5<f32>,

    /// one-hot 标签.
    pub targets: Array5<f32>,
}

impl Batch {
    /// 堆叠若干张量对. `pairs` 为空或形状不一致时返回 `Err`.
    pub fn from_pairs(ids: Vec<String>, pairs: &[TensorPair]) -> Result<Self> {
        let first = pairs.first().ok_or(ValidationError::Parameter {
            name: "pairs",
            reason: "批不能为空".to_string(),
        })?;
        let mismatch = |shape: &[usize], other: &[usize]| ShapeError::Mismatch {
            left: shape.to_vec(),
            right: other.to_vec(),
        };
        if let Some(p) = pairs.iter().find(|p| p.image.dim() != first.image.dim()) {
            return Err(mismatch(first.image.shape(), p.image.shape()).into());
        }
        if let Some(p) = pairs.iter().find(|p| p.label.dim() != first.label.dim()) {
            return Err(mismatch(first.label.shape(), p.label.shape()).into());
        }

        let images: Vec<_> = pairs.iter().map(|p| p.image.view()).collect();
        let labels: Vec<_> = pairs.iter().map(|p| p.label.view()).collect();
        let inputs = ndarray::stack(Axis(0), &images)
            .map_err(|_| mismatch(first.image.shape(), first.label.shape()))?;
        let targets = ndarray::stack(Axis(0), &labels)
            .map_err(|_| mismatch(first.image.shape(), first.label.shape()))?;
        Ok(Self {
            ids,
            inputs,
            targets,
        })
    }

    /// 批大小.
    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 数据集批加载器.
///
/// 打开 `rayon` feature 且 `num_workers > 1` 时, 同一批内的样本在专用线程池上并行加载.
pub struct DataLoader<'a, S> {
    dataset: &'a Dataset<S>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    #[cfg(feature = "rayon")]
    pool: Option<rayon::ThreadPool>,
}

impl<'a, S: VolumeSource> DataLoader<'a, S> {
    /// 创建加载器. `batch_size` 为 0 时返回 `Err`.
    pub fn new(dataset: &'a Dataset<S>, config: &LoaderConfig, order: Order) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(ValidationError::Parameter {
                name: "batch_size",
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if let Order::Shuffled(seed) = order {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }
        Ok(Self {
            dataset,
            order: indices,
            cursor: 0,
            batch_size: config.batch_size,
            #[cfg(feature = "rayon")]
            pool: worker_pool(config.num_workers),
        })
    }

    /// 剩余的样本索引, 按迭代顺序排列.
    #[inline]
    pub fn remaining(&self) -> &[usize] {
        &self.order[self.cursor..]
    }

    #[cfg(feature = "rayon")]
    fn fetch_all(&self, indices: &[usize]) -> Result<Vec<TensorPair>> {
        let dataset = self.dataset;
        match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| dataset.get(i))
                    .collect::<Result<Vec<_>>>()
            }),
            None => fetch_sequential(dataset, indices),
        }
    }

    #[cfg(not(feature = "rayon"))]
    #[inline]
    fn fetch_all(&self, indices: &[usize]) -> Result<Vec<TensorPair>> {
        fetch_sequential(self.dataset, indices)
    }
}

#[inline]
fn fetch_sequential<S: VolumeSource>(
    dataset: &Dataset<S>,
    indices: &[usize],
) -> Result<Vec<TensorPair>> {
    indices.iter().map(|&i| dataset.get(i)).collect()
}

#[cfg(feature = "rayon")]
fn worker_pool(workers: usize) -> Option<rayon::ThreadPool> {
    if workers <= 1 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!("cannot build {workers} loader workers, loading sequentially: {e}");
            None
        }
    }
}

impl<S: VolumeSource> Iterator for DataLoader<'_, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let ids = indices
            .iter()
            .map(|&i| self.dataset.ids()[i].clone())
            .collect();
        Some(
            self.fetch_all(indices)
                .and_then(|pairs| Batch::from_pairs(ids, &pairs)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len();
        (n, Some(n))
    }
}

impl<S: VolumeSource> ExactSizeIterator for DataLoader<'_, S> {
    #[inline]
    fn len(&self) -> usize {
        self.remaining().len().div_ceil(self.batch_size)
    }
}
