use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, ArrayD, Axis, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::config::DataPaths;
use crate::error::{Result, ShapeError, ValidationError};

pub mod resample;
pub mod resize;
pub mod window;

pub use resample::{Resampler, TensorPair};
pub use resize::DepthWindow;
pub use window::IntensityWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 3D MRI nii 文件 header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取单个体素分辨率, 以毫米为单位, 按 \[h, w, d\] 排列.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, h, w, d, ..] = self.header().pixdim;
        [h as f64, w as f64, d as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 判断该结构是否是由 `from_array` 手动拼接的.
    #[inline]
    fn is_faked(&self) -> bool {
        self.header().intent_name.starts_with(b"fake")
    }
}

/// 给内存中拼接的数据生成一个带标记的 header.
fn fake_header() -> BoxedHeader {
    let mut header = Box::<NiftiHeader>::default();
    header.pixdim[1..4].fill(1.0);
    header.intent_name[..4].copy_from_slice(b"fake");
    header
}

/// nii 格式多模态 MRI 扫描. 强度以 `f32` 保存, 形状为 `(h, w, d, c)`.
///
/// 3D 文件会被视为单通道扫描.
#[derive(Debug, Clone)]
pub struct MriVolume {
    header: BoxedHeader,
    data: Array4<f32>,
}

impl NiftiHeaderAttr for MriVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl MriVolume {
    /// 打开 nii (或 nii.gz) 文件格式的扫描. 文件缺失或损坏时返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        let data = obj.into_volume().into_ndarray::<f32>()?;
        let data = match data.ndim() {
            3 => into_4d(data.insert_axis(Axis(3)))?,
            4 => into_4d(data)?,
            n => return Err(ShapeError::Rank(n).into()),
        };
        Ok(Self { header, data })
    }

    /// 根据裸数据直接创建. `data` 按 `(h, w, d, c)` 组织.
    pub fn from_array(data: Array4<f32>) -> Self {
        Self {
            header: fake_header(),
            data,
        }
    }

    /// 空间形状 (h, w, d).
    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (h, w, d, _) = self.data.dim();
        [h, w, d]
    }

    /// 获取深度 (水平切片个数).
    #[inline]
    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// 模态通道个数.
    #[inline]
    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// 获取第 `index` 个模态的 3D 视图. `index` 越界时返回 `Err`.
    pub fn channel(&self, index: usize) -> std::result::Result<ArrayView3<'_, f32>, ValidationError> {
        let available = self.channels();
        if index >= available {
            return Err(ValidationError::MissingModality { index, available });
        }
        Ok(self.data.index_axis(Axis(3), index))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }
}

#[inline]
fn into_4d(data: ArrayD<f32>) -> Result<Array4<f32>> {
    let ndim = data.ndim();
    data.into_dimensionality::<Ix4>()
        .map_err(|_| ShapeError::Rank(ndim).into())
}

/// nii 格式 3D 标注. 标签值以 `u8` 保存, 形状为 `(h, w, d)`.
#[derive(Debug, Clone)]
pub struct MriLabel {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for MriLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl MriLabel {
    /// 打开 nii (或 nii.gz) 文件格式的标注. 文件缺失或损坏时返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        let data = obj.into_volume().into_ndarray::<u8>()?;
        let ndim = data.ndim();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| ShapeError::Rank(ndim))?;
        Ok(Self { header, data })
    }

    /// 根据裸数据直接创建. `data` 按 `(h, w, d)` 组织.
    pub fn from_array(data: Array3<u8>) -> Self {
        Self {
            header: fake_header(),
            data,
        }
    }

    /// 空间形状 (h, w, d).
    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (h, w, d) = self.data.dim();
        [h, w, d]
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 获取标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }
}

/// nii 格式的多模态扫描与对应的标注.
///
/// 该结构完全透明, 用户可以直接使用两个子结构.
/// 通过 [`MriData::new`] 或 [`MriData::open`] 创建时保证两者空间形状一致.
#[derive(Debug, Clone)]
pub struct MriData {
    /// 多模态扫描.
    pub volume: MriVolume,

    /// 标注.
    pub label: MriLabel,
}

impl MriData {
    /// 组合扫描和标注. 若两者空间形状不一致, 则返回 [`ShapeError::ScanLabelMismatch`].
    pub fn new(volume: MriVolume, label: MriLabel) -> Result<Self> {
        let (scan, label_shape) = (volume.spatial_shape(), label.spatial_shape());
        if scan != label_shape {
            return Err(ShapeError::ScanLabelMismatch {
                scan,
                label: label_shape,
            }
            .into());
        }
        Ok(Self { volume, label })
    }

    /// 分别打开扫描和对应标注. 任一文件打开失败或形状不一致时返回 `Err`.
    pub fn open(scan_path: impl AsRef<Path>, label_path: impl AsRef<Path>) -> Result<Self> {
        let volume = MriVolume::open(scan_path)?;
        let label = MriLabel::open(label_path)?;
        Self::new(volume, label)
    }
}

/// 能按样本 id 提供 (扫描, 标注) 的数据源.
///
/// 实现必须是无状态可重入的: 数据加载器会在多个线程上并发调用 `fetch`.
pub trait VolumeSource: Send + Sync {
    /// 列举所有样本 id.
    fn sample_ids(&self) -> Result<Vec<String>>;

    /// 加载样本 `id`.
    fn fetch(&self, id: &str) -> Result<MriData>;
}

/// 磁盘上两个平行目录构成的数据源, 对应的扫描和标注文件同名.
#[derive(Debug, Clone)]
pub struct NiftiDirs {
    image_dir: PathBuf,
    label_dir: PathBuf,
}

impl NiftiDirs {
    /// 创建数据源. 目录存在与否在首次访问时才检查.
    pub fn new(paths: DataPaths) -> Self {
        Self {
            image_dir: paths.image_dir,
            label_dir: paths.label_dir,
        }
    }

    /// 扫描目录.
    #[inline]
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// 标注目录.
    #[inline]
    pub fn label_dir(&self) -> &Path {
        &self.label_dir
    }
}

impl VolumeSource for NiftiDirs {
    /// 扫描目录下的所有普通文件名, 按字典序排列.
    ///
    /// 隐藏文件 (包括 macOS 打包时产生的 `._*` 文件) 会被忽略.
    fn sample_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.image_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                ids.push(name);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<MriData> {
        log::debug!("loading sample `{id}`");
        MriData::open(self.image_dir.join(id), self.label_dir.join(id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::Array;
    use nifti::writer::WriterOptions;

    /// 生成 `(h, w, d, c)` 的确定性测试扫描.
    pub(crate) fn ramp_volume((h, w, d, c): (usize, usize, usize, usize)) -> Array4<f32> {
        Array::from_shape_fn((h, w, d, c), |(i, j, k, m)| {
            (i * 7 + j * 3 + k * 5 + m * 11) as f32 % 97.0
        })
    }

    /// 生成 `(h, w, d)` 的确定性测试标注, 取值于 `[0, classes)`.
    pub(crate) fn stripe_label((h, w, d): (usize, usize, usize), classes: u8) -> Array3<u8> {
        Array::from_shape_fn((h, w, d), |(i, j, k)| ((i + j + k) % classes as usize) as u8)
    }

    #[test]
    fn test_nifti_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("imagesTr");
        let labels = dir.path().join("labelsTr");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();

        let scan = ramp_volume((6, 5, 4, 2));
        let label = stripe_label((6, 5, 4), 4);
        for id in ["BRATS_002.nii", "BRATS_001.nii"] {
            WriterOptions::new(images.join(id)).write_nifti(&scan).unwrap();
            WriterOptions::new(labels.join(id)).write_nifti(&label).unwrap();
        }
        fs::write(images.join("._BRATS_001.nii"), b"junk").unwrap();

        let source = NiftiDirs::new(DataPaths::from_root(dir.path()));
        let ids = source.sample_ids().unwrap();
        assert_eq!(ids, ["BRATS_001.nii", "BRATS_002.nii"]);

        let data = source.fetch(&ids[0]).unwrap();
        assert_eq!(data.volume.spatial_shape(), [6, 5, 4]);
        assert_eq!(data.volume.channels(), 2);
        assert_eq!(data.volume.data(), scan.view());
        assert_eq!(data.label.data(), label.view());
        assert!(!data.volume.is_faked());
    }

    #[test]
    fn test_missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = MriVolume::open(dir.path().join("nope.nii")).unwrap_err();
        assert!(err.is_io(), "{err:?}");
    }

    #[test]
    fn test_scan_label_mismatch() {
        let volume = MriVolume::from_array(ramp_volume((4, 4, 3, 1)));
        let label = MriLabel::from_array(stripe_label((4, 4, 2), 2));
        assert!(matches!(
            MriData::new(volume, label),
            Err(Error::Shape(ShapeError::ScanLabelMismatch { .. }))
        ));
    }

    #[test]
    fn test_channel_out_of_range() {
        let volume = MriVolume::from_array(ramp_volume((3, 3, 2, 2)));
        assert_eq!(volume.channel(1).unwrap()[(0, 0, 1)], volume.data()[(0, 0, 1, 1)]);
        assert_eq!(
            volume.channel(2).unwrap_err(),
            ValidationError::MissingModality {
                index: 2,
                available: 2
            }
        );
        let hollow = MriVolume::from_array(Array4::zeros((3, 3, 2, 0)));
        assert!(hollow.channel(0).is_err());
    }

    #[test]
    fn test_label_count() {
        let label = MriLabel::from_array(stripe_label((2, 2, 2), 2));
        assert_eq!(label.count(0) + label.count(1), 8);
        assert!(label.is_faked());
    }
}
