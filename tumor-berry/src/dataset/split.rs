//! 训练/验证/测试集划分.

use crate::config::SplitConfig;
use crate::error::{Result, ValidationError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// 数据集阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// 训练集.
    Train,

    /// 验证集.
    Validation,

    /// 测试集.
    Test,
}

impl Stage {
    /// 全部阶段, 按训练, 验证, 测试排列.
    pub const ALL: [Stage; 3] = [Stage::Train, Stage::Validation, Stage::Test];

    /// 阶段名, 可用作目录名.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Stage::Train => "train",
            Stage::Validation => "validation",
            Stage::Test => "test",
        }
    }
}

/// 随机划分 `items`, 返回 (剩余部分, 划出部分).
///
/// 划出部分大小为 `ceil(fraction * n)`. 先整体打乱, 再取前 `ceil(fraction * n)` 个作为划出部分.
/// `fraction` 必须位于 `(0, 1)`, 且两部分都必须非空, 否则返回 `Err`.
pub fn train_test_split<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    fraction: f64,
    rng: &mut R,
) -> std::result::Result<(Vec<T>, Vec<T>), ValidationError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ValidationError::InvalidFraction(fraction));
    }
    let total = items.len();
    let n_held = (fraction * total as f64).ceil() as usize;
    if n_held == 0 || n_held >= total {
        return Err(ValidationError::EmptySplit { total, fraction });
    }

    let mut held = items.to_vec();
    held.shuffle(rng);
    let rest = held.split_off(n_held);
    Ok((rest, held))
}

/// 一次运行中的样本划分. 创建后不可变.
///
/// 三个集合两两不交, 并集为全部样本.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    train: Vec<String>,
    validation: Vec<String>,
    test: Vec<String>,
}

impl Split {
    /// 先从 `ids` 划出验证集, 再从剩余部分划出测试集.
    pub fn new(ids: &[String], config: &SplitConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                log::warn!("no split seed given, the split is not reproducible");
                StdRng::from_entropy()
            }
        };
        let (rest, validation) = train_test_split(ids, config.validation_fraction, &mut rng)?;
        let (train, test) = train_test_split(&rest, config.test_fraction, &mut rng)?;
        log::info!(
            "split {} samples: {} train, {} validation, {} test",
            ids.len(),
            train.len(),
            validation.len(),
            test.len()
        );
        Ok(Self {
            train,
            validation,
            test,
        })
    }

    /// 训练集 id.
    #[inline]
    pub fn train(&self) -> &[String] {
        &self.train
    }

    /// 验证集 id.
    #[inline]
    pub fn validation(&self) -> &[String] {
        &self.validation
    }

    /// 测试集 id.
    #[inline]
    pub fn test(&self) -> &[String] {
        &self.test
    }

    /// 按阶段获取 id.
    #[inline]
    pub fn get(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::Train => self.train(),
            Stage::Validation => self.validation(),
            Stage::Test => self.test(),
        }
    }

    /// 样本总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// 是否为空. 由 [`Split::new`] 创建的划分永远非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
