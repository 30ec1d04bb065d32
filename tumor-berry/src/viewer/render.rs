//! 切片渲染.

use crate::consts::{class, palette, VIEWER_IMAGE_SIZE};
use crate::data::IntensityWindow;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::ArrayView2;

/// 全黑的灰度占位图.
#[inline]
pub fn empty_image() -> GrayImage {
    GrayImage::new(VIEWER_IMAGE_SIZE, VIEWER_IMAGE_SIZE)
}

/// 全黑的彩色占位图.
#[inline]
pub fn empty_segmentation() -> RgbImage {
    RgbImage::new(VIEWER_IMAGE_SIZE, VIEWER_IMAGE_SIZE)
}

/// 把 `(h, w)` 强度切片按 `window` 映射为灰度图, 再双线性缩放到查看器尺寸.
///
/// 无意义的强度 (NaN, inf) 显示为黑色.
pub fn slice_as_image(slice: ArrayView2<f32>, window: IntensityWindow) -> GrayImage {
    if slice.is_empty() {
        return empty_image();
    }
    let (height, width) = slice.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &v) in slice.indexed_iter() {
        buf.put_pixel(w as u32, h as u32, Luma([window.eval(v).unwrap_or(0)]));
    }
    imageops::resize(&buf, VIEWER_IMAGE_SIZE, VIEWER_IMAGE_SIZE, FilterType::Triangle)
}

/// 把 `(h, w)` 类别切片按调色板着色, 最近邻缩放到查看器尺寸.
///
/// 输出像素 `(x, y)` 取自 `(floor(y * h / N), floor(x * w / N))`, 因此只含调色板中的颜色.
pub fn segmentation_as_image(slice: ArrayView2<u8>) -> RgbImage {
    if slice.is_empty() {
        return empty_segmentation();
    }
    let (height, width) = slice.dim();
    let n = VIEWER_IMAGE_SIZE as usize;
    RgbImage::from_fn(VIEWER_IMAGE_SIZE, VIEWER_IMAGE_SIZE, |x, y| {
        let (h, w) = (y as usize * height / n, x as usize * width / n);
        Rgb(palette::color_of(slice[(h, w)]))
    })
}

/// 图例: 类别名和对应颜色, 按类别值排列.
pub fn legend() -> [(&'static str, [u8; 3]); class::NUM_CLASSES] {
    [
        ("Background", palette::BACKGROUND),
        ("Edema", palette::EDEMA),
        ("Non-enhancing Tumor", palette::NON_ENHANCING_TUMOR),
        ("Enhancing Tumor", palette::ENHANCING_TUMOR),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    #[test]
    fn test_empty() {
        assert_eq!(empty_image().dimensions(), (512, 512));
        assert!(empty_segmentation().pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_saturation() {
        let window = IntensityWindow::byte_range();
        let img = slice_as_image(Array2::from_elem((3, 5), 300.0f32).view(), window);
        assert_eq!(img.dimensions(), (512, 512));
        assert!(img.pixels().all(|p| p.0 == [255]));

        let img = slice_as_image(Array2::from_elem((3, 3), -20.0f32).view(), window);
        assert!(img.pixels().all(|p| p.0 == [0]));

        let img = slice_as_image(Array2::from_elem((3, 3), 100.0f32).view(), window);
        assert!(img.pixels().all(|p| p.0 == [100]));

        let img = slice_as_image(Array2::from_elem((2, 2), f32::NAN).view(), window);
        assert!(img.pixels().all(|p| p.0 == [0]));
    }

    #[test]
    fn test_palette_only() {
        let labels = arr2(&[[0u8, 1], [2, 3]]);
        let img = segmentation_as_image(labels.view());
        assert_eq!(img.dimensions(), (512, 512));
        assert_eq!(img.get_pixel(0, 0).0, palette::BACKGROUND);
        assert_eq!(img.get_pixel(511, 0).0, palette::EDEMA);
        assert_eq!(img.get_pixel(0, 511).0, palette::NON_ENHANCING_TUMOR);
        assert_eq!(img.get_pixel(511, 511).0, palette::ENHANCING_TUMOR);
        assert!(img.pixels().all(|p| palette::CLASS_COLORS.contains(&p.0)));
    }

    #[test]
    fn test_legend_matches_palette() {
        let colors: Vec<[u8; 3]> = legend().iter().map(|(_, c)| *c).collect();
        assert_eq!(colors, palette::CLASS_COLORS);
    }
}
