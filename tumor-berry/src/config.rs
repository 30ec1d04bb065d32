//! 流水线配置.
//!
//! 历史上存在多套加载器 (2 通道切片 + 最大值规范化, 4 通道体数据 + z-score 规范化),
//! 这里统一收敛为一个可配置的 [`PipelineConfig`].

use crate::consts::{self, is_power_of_two, modality, DEFAULT_INPUT_SIZE};
use crate::error::{ConfigError, Result, ShapeError, ValidationError};
use std::env;
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 强度规范化方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Normalization {
    /// 逐通道减均值除以 (总体) 标准差, 标准差加上 [`consts::NORM_EPS`].
    #[default]
    ZScore,

    /// 所有通道统一除以全局最大强度.
    MaxIntensity,
}

/// 原始深度小于目标深度时的处理策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShortDepth {
    /// 返回 [`ShapeError::DepthTooShort`].
    #[default]
    Reject,

    /// 以 0 居中填充.
    Pad,
}

/// 重采样配置.
///
/// 默认值: 128 x 128 x 128, 四个模态 (FLAIR, T1w, T1gd, T2w), 四个类别,
/// z-score 规范化, 深度不足时报错, 不检查 2 的幂.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// 目标高度 (体数据第一维).
    pub height: usize,

    /// 目标宽度 (体数据第二维).
    pub width: usize,

    /// 目标深度 (体数据第三维).
    pub depth: usize,

    /// 依次堆叠的模态通道下标.
    pub modalities: Vec<usize>,

    /// 类别个数.
    pub num_classes: usize,

    /// 强度规范化方式.
    pub normalization: Normalization,

    /// 深度不足时的策略.
    pub short_depth: ShortDepth,

    /// 是否要求高, 宽, 深度均为 2 的幂.
    pub require_power_of_two: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_INPUT_SIZE,
            width: DEFAULT_INPUT_SIZE,
            depth: DEFAULT_INPUT_SIZE,
            modalities: modality::DEFAULT_ORDER.to_vec(),
            num_classes: consts::class::NUM_CLASSES,
            normalization: Normalization::default(),
            short_depth: ShortDepth::default(),
            require_power_of_two: false,
        }
    }
}

impl PipelineConfig {
    /// 目标空间形状 (h, w, d).
    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        [self.height, self.width, self.depth]
    }

    /// 输入张量通道数.
    #[inline]
    pub fn in_channels(&self) -> usize {
        self.modalities.len()
    }

    /// 检查配置自身是否合法.
    pub fn validate(&self) -> Result<()> {
        if self.spatial_shape().contains(&0) {
            return Err(ShapeError::Empty.into());
        }
        if self.modalities.is_empty() {
            return Err(ValidationError::Parameter {
                name: "modalities",
                reason: "至少需要一个模态".to_string(),
            }
            .into());
        }
        if self.num_classes == 0 || self.num_classes > u8::MAX as usize + 1 {
            return Err(ValidationError::Parameter {
                name: "num_classes",
                reason: format!("{} 不在 [1, 256] 内", self.num_classes),
            }
            .into());
        }
        if self.require_power_of_two {
            for (name, value) in [
                ("height", self.height),
                ("width", self.width),
                ("depth", self.depth),
            ] {
                if !is_power_of_two(value as i64) {
                    return Err(ValidationError::NotPowerOfTwo { name, value }.into());
                }
            }
        }
        Ok(())
    }
}

/// 训练/验证/测试划分配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SplitConfig {
    /// 先从全集划出的验证集比例.
    pub validation_fraction: f64,

    /// 再从剩余部分划出的测试集比例.
    pub test_fraction: f64,

    /// 随机种子. `None` 时从系统熵源取种子, 划分不可复现.
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            test_fraction: 0.15,
            seed: None,
        }
    }
}

/// 数据加载配置.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoaderConfig {
    /// 批大小.
    pub batch_size: usize,

    /// 并行加载的工作线程数. 仅在 `rayon` feature 打开时生效.
    pub num_workers: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 4,
        }
    }
}

/// 训练配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainConfig {
    /// 固定学习率.
    pub learning_rate: f64,

    /// 最大 epoch 数.
    pub max_epochs: usize,

    /// 最优权重保存目录.
    pub checkpoint_dir: PathBuf,

    /// 训练集每个 epoch 的打乱种子基数. 第 `e` 个 epoch 使用 `seed + e`.
    pub shuffle_seed: Option<u64>,

    /// 加载配置.
    pub loader: LoaderConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            max_epochs: 1,
            checkpoint_dir: PathBuf::from("model"),
            shuffle_seed: None,
            loader: LoaderConfig::default(),
        }
    }
}

/// 图像目录环境变量.
pub const IMAGE_DIR_ENV: &str = "TUMOR_BERRY_IMAGE_DIR";

/// 标注目录环境变量.
pub const LABEL_DIR_ENV: &str = "TUMOR_BERRY_LABEL_DIR";

/// 运行模式环境变量.
pub const TRAIN_MODE_ENV: &str = "TUMOR_BERRY_TRAIN";

/// 两个平行目录: 多模态扫描和标注, 对应文件同名.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataPaths {
    /// 扫描目录.
    pub image_dir: PathBuf,

    /// 标注目录.
    pub label_dir: PathBuf,
}

impl DataPaths {
    /// 从 `{root}/imagesTr` 和 `{root}/labelsTr` 构建.
    pub fn from_root<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        Self {
            image_dir: root.join("imagesTr"),
            label_dir: root.join("labelsTr"),
        }
    }

    /// 获取数据目录.
    ///
    /// 1. 若环境变量 `$TUMOR_BERRY_IMAGE_DIR` / `$TUMOR_BERRY_LABEL_DIR` 非空, 则使用其值;
    /// 2. 否则, 使用 `$HOME/dataset/BrainTumourData/{imagesTr, labelsTr}`.
    pub fn from_env_or_home() -> Result<Self> {
        let home = || {
            crate::dataset::home_dataset_dir_with(["BrainTumourData"])
                .map(Self::from_root)
                .ok_or_else(|| ConfigError::Missing("HOME".to_string()))
        };
        let image_dir = match non_empty_var(IMAGE_DIR_ENV) {
            Some(d) => PathBuf::from(d),
            None => home()?.image_dir,
        };
        let label_dir = match non_empty_var(LABEL_DIR_ENV) {
            Some(d) => PathBuf::from(d),
            None => home()?.label_dir,
        };
        Ok(Self {
            image_dir,
            label_dir,
        })
    }
}

/// 进程运行模式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunMode {
    /// 训练 (数据准备).
    Train,

    /// 查看器.
    Serve,
}

impl RunMode {
    /// 从 `$TUMOR_BERRY_TRAIN` 读取. 未设置时为 [`RunMode::Serve`].
    pub fn from_env() -> Result<Self> {
        match env::var(TRAIN_MODE_ENV) {
            Ok(v) => Self::parse(&v),
            Err(env::VarError::NotPresent) => Ok(Self::Serve),
            Err(env::VarError::NotUnicode(v)) => Err(ConfigError::Invalid {
                key: TRAIN_MODE_ENV.to_string(),
                value: v.to_string_lossy().into_owned(),
            }
            .into()),
        }
    }

    /// 解析布尔风格的取值.
    pub fn parse(value: &str) -> Result<Self> {
        match parse_bool(value) {
            Some(true) => Ok(Self::Train),
            Some(false) => Ok(Self::Serve),
            None => Err(ConfigError::Invalid {
                key: TRAIN_MODE_ENV.to_string(),
                value: value.to_string(),
            }
            .into()),
        }
    }
}

/// 解析 `1/true/yes/on` 与 `0/false/no/off/""`, 忽略大小写和首尾空白.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[inline]
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
