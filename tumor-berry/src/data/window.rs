/// 强度窗口, 由下限和上限确定, 用于将 MRI 强度映射为 8-bit 灰度值.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    lower: f32,
    upper: f32,
}

impl IntensityWindow {
    /// 构建强度窗.
    ///
    /// `lower` 和 `upper` 必须有限且 `lower < upper`, 否则返回 `None`.
    pub fn new(lower: f32, upper: f32) -> Option<IntensityWindow> {
        if lower.is_finite() && upper.is_finite() && lower < upper {
            Some(Self { lower, upper })
        } else {
            None
        }
    }

    /// 窗口 \[0, 255\]. 相当于把强度直接饱和截断为 `u8`.
    #[inline]
    pub const fn byte_range() -> IntensityWindow {
        Self {
            lower: 0.0,
            upper: 255.0,
        }
    }

    /// 以 `data` 的最小值和最大值构建窗口.
    ///
    /// 若 `data` 为空, 不含有限值, 或所有有限值相等, 则返回 `None`.
    pub fn fit<'a, I: IntoIterator<Item = &'a f32>>(data: I) -> Option<IntensityWindow> {
        let (lo, hi) = data
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self::new(lo, hi)
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.lower
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.upper
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.upper - self.lower
    }

    /// 求在当前窗口设置下, `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        if !v.is_finite() {
            return None;
        }
        if v <= self.lower {
            Some(u8::MIN)
        } else if v >= self.upper {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((((v - self.lower) / self.width()) * 255.0) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IntensityWindow;

    #[test]
    fn test_window_invalid_input() {
        assert!(IntensityWindow::new(1.0, 1.0).is_none());
        assert!(IntensityWindow::new(2.0, 1.0).is_none());
        assert!(IntensityWindow::new(f32::NAN, 1.0).is_none());
        assert!(IntensityWindow::fit(&[3.0, 3.0]).is_none());
        assert!(IntensityWindow::fit(std::iter::empty()).is_none());
    }

    #[test]
    fn test_byte_range_saturates() {
        let w = IntensityWindow::byte_range();
        assert_eq!(w.eval(f32::NAN), None);
        assert_eq!(w.eval(-4.0), Some(0));
        assert_eq!(w.eval(12.7), Some(12));
        assert_eq!(w.eval(254.9), Some(254));
        assert_eq!(w.eval(1e6), Some(255));
    }

    #[test]
    fn test_fit() {
        let w = IntensityWindow::fit(&[f32::NAN, 10.0, 30.0, 20.0]).unwrap();
        assert_eq!(w.lower_bound(), 10.0);
        assert_eq!(w.upper_bound(), 30.0);
        assert_eq!(w.eval(20.0), Some(127));
        assert_eq!(w.eval(30.0), Some(255));
    }
}
