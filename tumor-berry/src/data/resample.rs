//! 把任意分辨率和深度的体数据重采样为固定形状的 (输入张量, one-hot 标签) 对.

use super::resize::{DepthWindow, PlaneResizer};
use super::{MriData, MriLabel, MriVolume};
use crate::config::{Normalization, PipelineConfig};
use crate::consts::NORM_EPS;
use crate::error::{Result, ShapeError, ValidationError};
use ndarray::{Array3, Array4, ArrayView3, ArrayView4, ArrayViewMut3, Axis};
use ndarray_npy::NpzWriter;
use ordered_float::OrderedFloat;
use std::fs::File;
use std::path::Path;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
    }
}

/// 模型可直接使用的张量对.
///
/// `image` 形状为 `(c, H, W, D)`, `label` 形状为 `(num_classes, H, W, D)`,
/// 两者空间维度相同, 且 `label` 在每个体素上沿类别轴求和为 1.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorPair {
    /// 规范化后的多通道输入.
    pub image: Array4<f32>,

    /// one-hot 标签.
    pub label: Array4<f32>,
}

impl TensorPair {
    /// 组合输入和标签. 两者空间形状不一致时返回 `Err`.
    pub fn new(image: Array4<f32>, label: Array4<f32>) -> Result<Self> {
        if image.shape()[1..] != label.shape()[1..] {
            return Err(ShapeError::Mismatch {
                left: image.shape().to_vec(),
                right: label.shape().to_vec(),
            }
            .into());
        }
        Ok(Self { image, label })
    }

    /// 空间形状 (H, W, D).
    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (_, h, w, d) = self.image.dim();
        [h, w, d]
    }

    /// 以 npz 格式保存到 `path`, 包含 `image.npy` 和 `label.npy` 两项.
    ///
    /// 供外部训练框架直接读取预处理结果.
    pub fn save_npz<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut npz = NpzWriter::new(File::create(path)?);
        npz.add_array("image.npy", &self.image)?;
        npz.add_array("label.npy", &self.label)?;
        npz.finish()?;
        Ok(())
    }
}

/// 体数据重采样器.
///
/// 对每个样本依次执行: 深度居中裁剪 (或填充), 逐切片平面缩放, 模态堆叠,
/// 强度规范化, 标签 one-hot 编码. 该结构只读, 可在多个线程间共享.
#[derive(Debug, Clone)]
pub struct Resampler {
    config: PipelineConfig,
}

impl Resampler {
    /// 创建重采样器. `config` 不合法时返回 `Err`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 当前配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 计算原始深度 `native` 对应的深度窗口.
    #[inline]
    pub fn depth_window(&self, native: usize) -> Result<DepthWindow> {
        Ok(DepthWindow::new(
            native,
            self.config.depth,
            self.config.short_depth,
        )?)
    }

    /// 把 `(h, w, d)` 平面缩放到 `(H, W)` 的缩放器.
    #[inline]
    fn plane_resizer(&self, [h, w, _]: [usize; 3]) -> Result<PlaneResizer> {
        Ok(PlaneResizer::new(
            (h, w),
            (self.config.height, self.config.width),
        )?)
    }

    /// 生成形状为 `(c, H, W, D)` 的规范化输入张量.
    pub fn prepare_input(&self, volume: &MriVolume) -> Result<Array4<f32>> {
        let sources = self
            .config
            .modalities
            .iter()
            .map(|&m| volume.channel(m))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let shape = volume.spatial_shape();
        let window = self.depth_window(shape[2])?;
        let resizer = self.plane_resizer(shape)?;

        let [height, width, depth] = self.config.spatial_shape();
        let mut out = Array4::zeros((self.config.in_channels(), height, width, depth));

        let fill = |(mut dst, src): (ArrayViewMut3<f32>, &ArrayView3<f32>)| {
            for (t, z) in window.target_range().zip(window.source_range()) {
                resizer.linear_into(
                    src.index_axis(Axis(2), z),
                    dst.index_axis_mut(Axis(2), t),
                );
            }
        };
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                out.axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .zip(sources.par_iter())
                    .for_each(fill);
            } else {
                out.axis_iter_mut(Axis(0))
                    .zip(sources.iter())
                    .for_each(fill);
            }
        }

        normalize(&mut out, self.config.normalization)?;
        Ok(out)
    }

    /// 把标注重采样到 `(H, W, D)`. 填充区域视为背景.
    pub fn resample_label(&self, label: &MriLabel) -> Result<Array3<u8>> {
        let shape = label.spatial_shape();
        let window = self.depth_window(shape[2])?;
        let resizer = self.plane_resizer(shape)?;

        let mut out = Array3::zeros((self.config.height, self.config.width, self.config.depth));
        let src = label.data();
        for (t, z) in window.target_range().zip(window.source_range()) {
            resizer.nearest_into(src.index_axis(Axis(2), z), out.index_axis_mut(Axis(2), t));
        }
        Ok(out)
    }

    /// 生成形状为 `(num_classes, H, W, D)` 的 one-hot 标签张量.
    pub fn one_hot(&self, label: &MriLabel) -> Result<Array4<f32>> {
        let resized = self.resample_label(label)?;
        Ok(one_hot_encode(resized.view(), self.config.num_classes)?)
    }

    /// 重采样一个样本.
    pub fn resample(&self, data: &MriData) -> Result<TensorPair> {
        let image = self.prepare_input(&data.volume)?;
        let label = self.one_hot(&data.label)?;
        TensorPair::new(image, label)
    }
}

/// 就地规范化 `(c, H, W, D)` 张量, 并检查结果是否全部有限.
pub fn normalize(
    x: &mut Array4<f32>,
    mode: Normalization,
) -> std::result::Result<(), ValidationError> {
    match mode {
        Normalization::ZScore => {
            for mut channel in x.axis_iter_mut(Axis(0)) {
                let n = channel.len() as f64;
                let mean = channel.iter().map(|v| *v as f64).sum::<f64>() / n;
                let var = channel
                    .iter()
                    .map(|v| (*v as f64 - mean).powi(2))
                    .sum::<f64>()
                    / n;
                let (mean, std) = (mean as f32, var.sqrt() as f32 + NORM_EPS);
                channel.mapv_inplace(|v| (v - mean) / std);
            }
        }
        Normalization::MaxIntensity => {
            if let Some(OrderedFloat(max)) = x.iter().copied().map(OrderedFloat).max() {
                x.mapv_inplace(|v| v / max);
            }
        }
    }
    for (channel, view) in x.axis_iter(Axis(0)).enumerate() {
        if !view.iter().all(|v| v.is_finite()) {
            return Err(ValidationError::NonFinite { channel });
        }
    }
    Ok(())
}

/// 将 `(H, W, D)` 整数标签展开为 `(num_classes, H, W, D)` 的 one-hot 张量.
///
/// 存在不小于 `num_classes` 的标签值时返回 `Err`.
pub fn one_hot_encode(
    labels: ArrayView3<u8>,
    num_classes: usize,
) -> std::result::Result<Array4<f32>, ValidationError> {
    if let Some(&value) = labels.iter().find(|v| **v as usize >= num_classes) {
        return Err(ValidationError::ClassOutOfRange { value, num_classes });
    }
    let (h, w, d) = labels.dim();
    let mut out = Array4::zeros((num_classes, h, w, d));
    for ((i, j, k), &v) in labels.indexed_iter() {
        out[(v as usize, i, j, k)] = 1.0;
    }
    Ok(out)
}

/// 沿类别轴 (第 0 轴) 取 arg-max, 得到 `(H, W, D)` 类别下标. 并列时取较小的类别.
///
/// 类别个数不受限制. 类别轴长度为 0 时返回 `None`.
pub fn argmax_indices(scores: ArrayView4<f32>) -> Option<Array3<usize>> {
    let (n, h, w, d) = scores.dim();
    if n == 0 {
        return None;
    }
    Some(Array3::from_shape_fn((h, w, d), |(i, j, k)| {
        let mut best = 0usize;
        for c in 1..n {
            if scores[(c, i, j, k)] > scores[(best, i, j, k)] {
                best = c;
            }
        }
        best
    }))
}

/// 同 [`argmax_indices`], 但输出 `u8` 标签图.
///
/// 是 [`one_hot_encode`] 的逆运算, 也用于把模型输出的概率转为类别.
/// 类别轴长度必须位于 `[1, 256]`, 否则返回 `Err`.
pub fn argmax_classes(scores: ArrayView4<f32>) -> std::result::Result<Array3<u8>, ValidationError> {
    let n = scores.len_of(Axis(0));
    if n > u8::MAX as usize + 1 {
        return Err(ValidationError::Parameter {
            name: "num_classes",
            reason: format!("{n} 个类别无法用 u8 表示"),
        });
    }
    argmax_indices(scores)
        .map(|classes| classes.mapv(|c| c as u8))
        .ok_or(ValidationError::Parameter {
            name: "num_classes",
            reason: "类别轴为空".to_string(),
        })
}
