//! 通用常量.

/// 标签类别.
pub mod class {
    /// 背景的体素值.
    pub const BACKGROUND: u8 = 0;

    /// 水肿的体素值.
    pub const EDEMA: u8 = 1;

    /// 非增强肿瘤的体素值.
    pub const NON_ENHANCING_TUMOR: u8 = 2;

    /// 增强肿瘤的体素值.
    pub const ENHANCING_TUMOR: u8 = 3;

    /// 类别总数.
    pub const NUM_CLASSES: usize = 4;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 体素是否属于任意肿瘤区域 (含水肿)?
    #[inline]
    pub const fn is_tumor(p: u8) -> bool {
        matches!(p, EDEMA | NON_ENHANCING_TUMOR | ENHANCING_TUMOR)
    }
}

/// 模态通道在 4D 体数据中的下标.
pub mod modality {
    /// FLAIR.
    pub const FLAIR: usize = 0;

    /// T1 加权.
    pub const T1W: usize = 1;

    /// T1 加权增强 (gadolinium).
    pub const T1GD: usize = 2;

    /// T2 加权.
    pub const T2W: usize = 3;

    /// 默认的通道堆叠顺序.
    pub const DEFAULT_ORDER: [usize; 4] = [FLAIR, T1W, T1GD, T2W];
}

/// 可视化用 RGB 颜色.
pub mod palette {
    /// 背景, `#440054`.
    pub const BACKGROUND: [u8; 3] = [68, 0, 84];

    /// 水肿, `#3b528b`.
    pub const EDEMA: [u8; 3] = [59, 82, 139];

    /// 非增强肿瘤, `#18b880`.
    pub const NON_ENHANCING_TUMOR: [u8; 3] = [24, 184, 128];

    /// 增强肿瘤, `#e6d74f`.
    pub const ENHANCING_TUMOR: [u8; 3] = [230, 215, 79];

    /// 按类别值索引的调色板.
    pub const CLASS_COLORS: [[u8; 3]; 4] = [BACKGROUND, EDEMA, NON_ENHANCING_TUMOR, ENHANCING_TUMOR];

    /// 获取类别 `label` 的颜色. 未知类别显示为黑色.
    #[inline]
    pub fn color_of(label: u8) -> [u8; 3] {
        CLASS_COLORS
            .get(label as usize)
            .copied()
            .unwrap_or([0, 0, 0])
    }
}

/// 默认输入边长 (高, 宽, 深度均使用).
pub const DEFAULT_INPUT_SIZE: usize = 128;

/// 查看器输出图像边长.
pub const VIEWER_IMAGE_SIZE: u32 = 512;

/// z-score 规范化时加到标准差上的小量.
pub const NORM_EPS: f32 = 1e-8;

/// 评估指标分母上的小量.
pub const METRIC_EPS: f64 = 1e-6;

/// 判断 `n` 是否为 2 的幂. 0 和负数都不是.
#[inline]
pub const fn is_power_of_two(n: i64) -> bool {
    n > 0 && (n & (n - 1)) == 0
}
