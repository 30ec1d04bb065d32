//! 交互式查看器的会话状态.
//!
//! 会话持有当前上传的体数据, 其深度窗口, 模型给出的分割结果, 以及可选的模型.
//! 切片编号从 1 开始, 取值范围为 `1..=depth`, `depth` 为模型输入深度.
//!
//! 灰度图取自原始体数据的第 0 个模态. 第 `k` 张目标切片经深度窗口映射回原始深度,
//! 因此灰度图与分割图总是对应同一层解剖结构. 落在填充区域的切片显示为黑色.

use crate::config::PipelineConfig;
use crate::data::resample::argmax_classes;
use crate::data::{DepthWindow, IntensityWindow, MriVolume, Resampler};
use crate::error::{Result, ShapeError, ValidationError};
use crate::model::Segmenter;
use image::{GrayImage, RgbImage};
use ndarray::{Array3, Axis};
use std::path::{Path, PathBuf};

mod render;

pub use render::{empty_image, empty_segmentation, legend, segmentation_as_image, slice_as_image};

/// 一对渲染结果: 灰度切片和彩色分割.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicePair {
    /// 灰度切片.
    pub image: GrayImage,

    /// 分割.
    pub segmentation: RgbImage,
}

impl SlicePair {
    /// 两张占位图.
    pub fn blank() -> Self {
        Self {
            image: empty_image(),
            segmentation: empty_segmentation(),
        }
    }

    /// 保存为 `{dir}/{stem}_image.png` 和 `{dir}/{stem}_segmentation.png`.
    pub fn save<P: AsRef<Path>>(&self, dir: P, stem: &str) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        let image = dir.join(format!("{stem}_image.png"));
        let segmentation = dir.join(format!("{stem}_segmentation.png"));
        self.image.save(&image)?;
        self.segmentation.save(&segmentation)?;
        Ok((image, segmentation))
    }
}

/// 已加载的体数据.
struct Loaded {
    volume: MriVolume,
    window: DepthWindow,
    segmentation: Option<Array3<u8>>,
}

/// 查看器会话.
pub struct ViewerSession {
    resampler: Resampler,
    intensity: IntensityWindow,
    model: Option<Box<dyn Segmenter>>,
    current: Option<Loaded>,
}

impl ViewerSession {
    /// 创建没有模型的会话. `config` 不合法时返回 `Err`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Self {
            resampler: Resampler::new(config)?,
            intensity: IntensityWindow::byte_range(),
            model: None,
            current: None,
        })
    }

    /// 载入模型, 并切换到推理模式. 之后的 [`ViewerSession::make_segmentation`] 会使用它.
    pub fn load_model(&mut self, mut model: Box<dyn Segmenter>) {
        model.set_training(false);
        self.model = Some(model);
    }

    /// 是否已载入模型.
    #[inline]
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// 设置灰度映射窗口. 默认为 \[0, 255\] 饱和截断.
    #[inline]
    pub fn set_intensity_window(&mut self, window: IntensityWindow) {
        self.intensity = window;
    }

    /// 切片个数, 即合法切片编号的上限.
    #[inline]
    pub fn depth(&self) -> usize {
        self.resampler.config().depth
    }

    /// 当前分割结果, 形状为 `(H, W, D)`.
    pub fn segmentation(&self) -> Option<&Array3<u8>> {
        self.current.as_ref()?.segmentation.as_ref()
    }

    /// 切片编号 `slice` 对应的原始深度下标. 未加载数据或落在填充区域时返回 `None`.
    pub fn native_index(&self, slice: usize) -> Option<usize> {
        let index = slice.checked_sub(1)?;
        self.current.as_ref()?.window.to_native(index)
    }

    fn check_slice(&self, slice: usize) -> Result<usize> {
        let depth = self.depth();
        if slice == 0 || slice > depth {
            return Err(ValidationError::SliceOutOfRange {
                index: slice,
                depth,
            }
            .into());
        }
        Ok(slice - 1)
    }

    /// 加载上传的体数据并分割, 返回第 `slice` 张切片.
    ///
    /// `upload` 为 `None` 时返回占位图, 会话状态不变.
    /// 未载入模型时只显示灰度图, 分割为占位图.
    pub fn make_segmentation(&mut self, upload: Option<&Path>, slice: usize) -> Result<SlicePair> {
        self.check_slice(slice)?;
        let Some(path) = upload else {
            return Ok(SlicePair::blank());
        };

        let volume = MriVolume::open(path)?;
        let window = self.resampler.depth_window(volume.depth())?;
        let segmentation = match &self.model {
            Some(model) => {
                let input = self.resampler.prepare_input(&volume)?.insert_axis(Axis(0));
                let output = model.forward(input.view())?;
                let config = self.resampler.config();
                let [h, w, d] = config.spatial_shape();
                let expected = [1, config.num_classes, h, w, d];
                if output.shape() != expected {
                    return Err(ShapeError::Mismatch {
                        left: expected.to_vec(),
                        right: output.shape().to_vec(),
                    }
                    .into());
                }
                let classes = argmax_classes(output.index_axis(Axis(0), 0))?;
                if log::log_enabled!(log::Level::Debug) {
                    let mut present: Vec<u8> = classes.iter().copied().collect();
                    present.sort_unstable();
                    present.dedup();
                    log::debug!("classes in segmentation: {present:?}");
                }
                Some(classes)
            }
            None => {
                log::warn!("no model loaded, showing the scan only");
                None
            }
        };
        log::info!("loaded `{}`", path.display());

        self.current = Some(Loaded {
            volume,
            window,
            segmentation,
        });
        self.change_slice(slice)
    }

    /// 切换到第 `slice` 张切片. 未加载数据时返回占位图.
    pub fn change_slice(&self, slice: usize) -> Result<SlicePair> {
        let index = self.check_slice(slice)?;
        let Some(current) = &self.current else {
            return Ok(SlicePair::blank());
        };

        let image = match current.window.to_native(index) {
            Some(z) => slice_as_image(
                current.volume.channel(0)?.index_axis(Axis(2), z),
                self.intensity,
            ),
            None => empty_image(),
        };
        let segmentation = match &current.segmentation {
            Some(seg) => segmentation_as_image(seg.index_axis(Axis(2), index)),
            None => empty_segmentation(),
        };
        Ok(SlicePair {
            image,
            segmentation,
        })
    }
}
