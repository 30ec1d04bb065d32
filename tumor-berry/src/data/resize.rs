//! 深度居中裁剪/填充与平面缩放.
//!
//! 平面缩放沿用 OpenCV 的采样约定: 双线性插值使用半像素中心
//! (`src = (dst + 0.5) * scale - 0.5`, 越界时夹到边缘), 最近邻插值使用
//! `src = floor(dst * scale)`. 这样与原先基于 `cv2.resize` 训练出的权重保持一致.

use crate::config::ShortDepth;
use crate::error::ShapeError;
use crate::Idx2d;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use std::ops::Range;

/// 深度方向的居中窗口.
///
/// 原始深度 `D` 不小于目标深度 `T` 时, 保留 `[start, end)`, 其中
/// `diff = D - T`, `start = diff / 2`, `end = D - (diff - start)`, 奇数余量落在末尾.
/// `D < T` 且策略为 [`ShortDepth::Pad`] 时, 原始数据整体放入目标的
/// `[(T - D) / 2, (T - D) / 2 + D)`, 其余为 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DepthWindow {
    native: usize,
    target: usize,
    src_start: usize,
    dst_start: usize,
    len: usize,
}

impl DepthWindow {
    /// 计算窗口. 深度为 0, 或深度不足且策略为 [`ShortDepth::Reject`] 时返回 `Err`.
    pub fn new(native: usize, target: usize, policy: ShortDepth) -> Result<Self, ShapeError> {
        if native == 0 || target == 0 {
            return Err(ShapeError::Empty);
        }
        if native >= target {
            let diff = native - target;
            let start = diff / 2;
            let end = native - (diff - start);
            debug_assert_eq!(end - start, target);
            return Ok(Self {
                native,
                target,
                src_start: start,
                dst_start: 0,
                len: end - start,
            });
        }
        match policy {
            ShortDepth::Reject => Err(ShapeError::DepthTooShort(native, target)),
            ShortDepth::Pad => Ok(Self {
                native,
                target,
                src_start: 0,
                dst_start: (target - native) / 2,
                len: native,
            }),
        }
    }

    /// 原始深度.
    #[inline]
    pub fn native(&self) -> usize {
        self.native
    }

    /// 目标深度.
    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    /// 被保留的原始切片范围.
    #[inline]
    pub fn source_range(&self) -> Range<usize> {
        self.src_start..self.src_start + self.len
    }

    /// 原始切片在目标中的落点范围.
    #[inline]
    pub fn target_range(&self) -> Range<usize> {
        self.dst_start..self.dst_start + self.len
    }

    /// 是否需要填充.
    #[inline]
    pub fn is_padded(&self) -> bool {
        self.len < self.target
    }

    /// 将目标深度下标 (从 0 开始) 映射回原始深度下标. 落在填充区域时返回 `None`.
    #[inline]
    pub fn to_native(&self, target_index: usize) -> Option<usize> {
        self.target_range()
            .contains(&target_index)
            .then(|| self.src_start + target_index - self.dst_start)
    }
}

/// 插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Interpolation {
    /// 双线性. 用于连续的强度通道.
    Linear,

    /// 最近邻. 用于整数标签, 不会产生不存在的类别值.
    Nearest,
}

/// 单轴上的双线性采样点.
#[derive(Copy, Clone, Debug)]
struct LinearTap {
    lo: usize,
    hi: usize,
    frac: f32,
}

fn linear_taps(src: usize, dst: usize) -> Vec<LinearTap> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let f = (d as f64 + 0.5) * scale - 0.5;
            let s = f.floor();
            let (lo, frac) = if s < 0.0 {
                (0, 0.0)
            } else if s as usize + 1 >= src {
                (src - 1, 0.0)
            } else {
                (s as usize, f - s)
            };
            LinearTap {
                lo,
                hi: (lo + 1).min(src - 1),
                frac: frac as f32,
            }
        })
        .collect()
}

fn nearest_taps(src: usize, dst: usize) -> Vec<usize> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| ((d as f64 * scale).floor() as usize).min(src - 1))
        .collect()
}

/// 固定输入/输出形状的平面缩放器. 采样点只计算一次, 可复用于同形状的所有切片.
#[derive(Clone, Debug)]
pub struct PlaneResizer {
    src: Idx2d,
    dst: Idx2d,
    rows: Vec<LinearTap>,
    cols: Vec<LinearTap>,
    near_rows: Vec<usize>,
    near_cols: Vec<usize>,
}

impl PlaneResizer {
    /// 创建 `(h, w)` 到 `(h', w')` 的缩放器. 任一尺寸为 0 时返回 `Err`.
    pub fn new(src: Idx2d, dst: Idx2d) -> Result<Self, ShapeError> {
        if src.0 == 0 || src.1 == 0 || dst.0 == 0 || dst.1 == 0 {
            return Err(ShapeError::Empty);
        }
        Ok(Self {
            src,
            dst,
            rows: linear_taps(src.0, dst.0),
            cols: linear_taps(src.1, dst.1),
            near_rows: nearest_taps(src.0, dst.0),
            near_cols: nearest_taps(src.1, dst.1),
        })
    }

    /// 输出形状.
    #[inline]
    pub fn output_shape(&self) -> Idx2d {
        self.dst
    }

    /// 双线性缩放 `src`, 写入 `dst`.
    ///
    /// 两者形状与构造时不符时 panic.
    pub fn linear_into(&self, src: ArrayView2<f32>, mut dst: ArrayViewMut2<f32>) {
        assert_eq!(src.dim(), self.src, "输入形状不符");
        assert_eq!(dst.dim(), self.dst, "输出形状不符");
        for ((h, w), out) in dst.indexed_iter_mut() {
            let (r, c) = (self.rows[h], self.cols[w]);
            let top = src[(r.lo, c.lo)] * (1.0 - c.frac) + src[(r.lo, c.hi)] * c.frac;
            let bottom = src[(r.hi, c.lo)] * (1.0 - c.frac) + src[(r.hi, c.hi)] * c.frac;
            *out = top * (1.0 - r.frac) + bottom * r.frac;
        }
    }

    /// 最近邻缩放 `src`, 写入 `dst`.
    ///
    /// 两者形状与构造时不符时 panic.
    pub fn nearest_into<T: Copy>(&self, src: ArrayView2<T>, mut dst: ArrayViewMut2<T>) {
        assert_eq!(src.dim(), self.src, "输入形状不符");
        assert_eq!(dst.dim(), self.dst, "输出形状不符");
        for ((h, w), out) in dst.indexed_iter_mut() {
            *out = src[(self.near_rows[h], self.near_cols[w])];
        }
    }
}

/// 把 `src` 按 `interp` 缩放到 `shape`.
pub fn resize_f32(
    src: ArrayView2<f32>,
    shape: Idx2d,
    interp: Interpolation,
) -> Result<Array2<f32>, ShapeError> {
    let resizer = PlaneResizer::new(src.dim(), shape)?;
    let mut out = Array2::zeros(shape);
    match interp {
        Interpolation::Linear => resizer.linear_into(src, out.view_mut()),
        Interpolation::Nearest => resizer.nearest_into(src, out.view_mut()),
    }
    Ok(out)
}

/// 把整数标签平面 `src` 最近邻缩放到 `shape`.
pub fn resize_labels(src: ArrayView2<u8>, shape: Idx2d) -> Result<Array2<u8>, ShapeError> {
    let resizer = PlaneResizer::new(src.dim(), shape)?;
    let mut out = Array2::zeros(shape);
    resizer.nearest_into(src, out.view_mut());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Array};

    #[test]
    fn test_depth_window_crop() {
        let w = DepthWindow::new(155, 128, ShortDepth::Reject).unwrap();
        assert_eq!(w.source_range(), 13..141);
        assert_eq!(w.source_range().len(), 128);
        assert_eq!(w.target_range(), 0..128);
        assert_eq!(w.to_native(0), Some(13));
        assert_eq!(w.to_native(127), Some(140));
        assert_eq!(w.to_native(128), None);
        assert!(!w.is_padded());

        let even = DepthWindow::new(130, 128, ShortDepth::Reject).unwrap();
        assert_eq!(even.source_range(), 1..129);
        let same = DepthWindow::new(64, 64, ShortDepth::Reject).unwrap();
        assert_eq!(same.source_range(), 0..64);
    }

    #[test]
    fn test_depth_window_short() {
        assert_eq!(
            DepthWindow::new(100, 128, ShortDepth::Reject),
            Err(ShapeError::DepthTooShort(100, 128))
        );
        let w = DepthWindow::new(100, 128, ShortDepth::Pad).unwrap();
        assert!(w.is_padded());
        assert_eq!(w.source_range(), 0..100);
        assert_eq!(w.target_range(), 14..114);
        assert_eq!(w.to_native(13), None);
        assert_eq!(w.to_native(14), Some(0));
        assert_eq!(w.to_native(113), Some(99));
        assert_eq!(w.to_native(114), None);

        assert_eq!(
            DepthWindow::new(0, 128, ShortDepth::Pad),
            Err(ShapeError::Empty)
        );
    }

    #[test]
    fn test_linear_matches_half_pixel_convention() {
        let src = arr2(&[[0.0f32, 1.0]]);
        let up = resize_f32(src.view(), (1, 4), Interpolation::Linear).unwrap();
        for (got, want) in up.iter().zip([0.0f32, 0.25, 0.75, 1.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
        }

        let src = arr2(&[[0.0f32, 1.0, 2.0, 3.0]]);
        let down = resize_f32(src.view(), (1, 2), Interpolation::Linear).unwrap();
        assert_abs_diff_eq!(down[(0, 0)], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(down[(0, 1)], 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_identity_and_constant() {
        let src = Array::from_shape_fn((5, 7), |(h, w)| (h * 7 + w) as f32);
        let same = resize_f32(src.view(), (5, 7), Interpolation::Linear).unwrap();
        assert_eq!(same, src);

        let flat = Array2::from_elem((9, 6), 3.5f32);
        let out = resize_f32(flat.view(), (4, 13), Interpolation::Linear).unwrap();
        assert!(out.iter().all(|v| (*v - 3.5).abs() < 1e-6));
    }

    #[test]
    fn test_nearest_keeps_label_set() {
        let src = arr2(&[[0u8, 1], [2, 3]]);
        let up = resize_labels(src.view(), (4, 4)).unwrap();
        assert_eq!(
            up,
            arr2(&[[0, 0, 1, 1], [0, 0, 1, 1], [2, 2, 3, 3], [2, 2, 3, 3]])
        );

        let big = Array::from_shape_fn((240, 240), |(h, w)| ((h / 60 + w / 60) % 4) as u8);
        let down = resize_labels(big.view(), (128, 128)).unwrap();
        assert!(down.iter().all(|v| *v < 4));
    }

    #[test]
    fn test_empty_plane() {
        let src = Array2::<f32>::zeros((0, 3));
        assert_eq!(
            resize_f32(src.view(), (2, 2), Interpolation::Nearest).unwrap_err(),
            ShapeError::Empty
        );
    }
}
