//! 运行时错误.
//!
//! 按关注点划分为形状错误, 校验错误和配置错误三类, 再由 [`Error`] 统一汇总,
//! 同时承载底层 I/O, nifti, npz 和图像编解码错误.

use thiserror::Error;

/// 形状不一致, 且无法通过裁剪/缩放解决.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// 原始深度小于目标深度, 且当前策略不允许填充.
    ///
    /// 第一个参数为原始深度, 第二个参数为目标深度.
    #[error("原始深度 {0} 小于目标深度 {1}")]
    DepthTooShort(usize, usize),

    /// 扫描与标注的空间形状不一致.
    #[error("扫描空间形状 {scan:?} 与标注空间形状 {label:?} 不一致")]
    ScanLabelMismatch {
        /// 扫描的 (h, w, d).
        scan: [usize; 3],
        /// 标注的 (h, w, d).
        label: [usize; 3],
    },

    /// 两个张量的形状不一致.
    #[error("张量形状不一致: {left:?} vs {right:?}")]
    Mismatch {
        /// 左侧形状.
        left: Vec<usize>,
        /// 右侧形状.
        right: Vec<usize>,
    },

    /// nifti 数据维数不受支持.
    #[error("不支持 {0} 维数据")]
    Rank(usize),

    /// 空间尺寸为 0.
    #[error("空间尺寸不能为 0")]
    Empty,
}

/// 数据或参数校验失败.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// 配置尺寸要求为 2 的幂, 但不是.
    #[error("`{name}` = {value} 不是 2 的幂")]
    NotPowerOfTwo {
        /// 参数名.
        name: &'static str,
        /// 实际值.
        value: usize,
    },

    /// 标签值超出 `[0, num_classes)`.
    #[error("标签值 {value} 超出类别范围 [0, {num_classes})")]
    ClassOutOfRange {
        /// 实际标签值.
        value: u8,
        /// 类别个数.
        num_classes: usize,
    },

    /// 规范化后出现 inf 或 NaN.
    #[error("规范化后第 {channel} 通道出现非有限值")]
    NonFinite {
        /// 出现问题的通道.
        channel: usize,
    },

    /// 请求的模态通道在体数据中不存在.
    #[error("模态通道 {index} 不存在, 体数据只有 {available} 个通道")]
    MissingModality {
        /// 请求的通道.
        index: usize,
        /// 实际通道个数.
        available: usize,
    },

    /// 加权召回率的权重个数与 `num_classes - 1` 不符.
    #[error("权重个数 {weights} 与前景类别个数 {expected} 不符")]
    WeightLength {
        /// 实际权重个数.
        weights: usize,
        /// 期望权重个数.
        expected: usize,
    },

    /// 划分比例不在 `(0, 1)` 内.
    #[error("划分比例 {0} 必须位于 (0, 1)")]
    InvalidFraction(f64),

    /// 划分后某一部分为空.
    #[error("{total} 个样本按比例 {fraction} 划分后出现空集")]
    EmptySplit {
        /// 样本总数.
        total: usize,
        /// 划分比例.
        fraction: f64,
    },

    /// 切片索引越界. 切片索引从 1 开始.
    #[error("切片索引 {index} 超出范围 [1, {depth}]")]
    SliceOutOfRange {
        /// 实际索引.
        index: usize,
        /// 深度.
        depth: usize,
    },

    /// 样本索引越界.
    #[error("样本索引 {index} 超出数据集大小 {len}")]
    IndexOutOfRange {
        /// 实际索引.
        index: usize,
        /// 数据集大小.
        len: usize,
    },

    /// 集成模型至少需要一个成员.
    #[error("集成模型成员为空")]
    EmptyEnsemble,

    /// 其余参数不合法.
    #[error("参数 `{name}` 不合法: {reason}")]
    Parameter {
        /// 参数名.
        name: &'static str,
        /// 原因.
        reason: String,
    },
}

/// 配置缺失或无法解析.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 缺少必需的配置值.
    #[error("缺少配置 `{0}`")]
    Missing(String),

    /// 配置值无法解析.
    #[error("配置 `{key}` 的值 `{value}` 无法解析")]
    Invalid {
        /// 配置键.
        key: String,
        /// 原始值.
        value: String,
    },
}

/// 本 crate 的统一错误类型.
#[derive(Debug, Error)]
pub enum Error {
    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// nifti 文件缺失或损坏.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// npz 写入错误.
    #[error(transparent)]
    Npz(#[from] ndarray_npy::WriteNpzError),

    /// 图像编码错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 形状错误.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// 校验错误.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// 是否属于 I/O 类错误 (文件缺失或损坏).
    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Nifti(_))
    }
}

/// 本 crate 的 `Result`.
pub type Result<T> = std::result::Result<T, Error>;
