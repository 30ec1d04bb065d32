//! 损失函数.

use crate::error::ShapeError;
use ndarray::{ArrayView5, Axis, Zip};

/// 分割损失. 输入为 `(B, C, H, W, D)` 的网络输出和 one-hot 真值.
pub trait LossFn: Send + Sync {
    /// 计算一批的标量损失.
    fn loss(&self, preds: ArrayView5<f32>, targets: ArrayView5<f32>) -> Result<f64, ShapeError>;
}

/// Soft Dice 损失.
///
/// 对每个 (样本, 类别) 计算 `1 - (2I + smooth_nr) / (P + T + smooth_dr)`, 再取平均.
/// `softmax` 为真时先沿类别轴对输出做 softmax.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiceLoss {
    /// 是否先做 softmax.
    pub softmax: bool,

    /// 分子平滑项.
    pub smooth_nr: f64,

    /// 分母平滑项.
    pub smooth_dr: f64,
}

impl Default for DiceLoss {
    fn default() -> Self {
        Self {
            softmax: false,
            smooth_nr: 1e-5,
            smooth_dr: 1e-5,
        }
    }
}

impl DiceLoss {
    /// 对网络原始输出做 softmax 的 Dice 损失.
    pub fn with_softmax() -> Self {
        Self {
            softmax: true,
            ..Default::default()
        }
    }
}

impl LossFn for DiceLoss {
    fn loss(&self, preds: ArrayView5<f32>, targets: ArrayView5<f32>) -> Result<f64, ShapeError> {
        if preds.shape() != targets.shape() {
            return Err(ShapeError::Mismatch {
                left: preds.shape().to_vec(),
                right: targets.shape().to_vec(),
            });
        }
        if preds.is_empty() {
            return Err(ShapeError::Empty);
        }

        let probs = if self.softmax {
            let mut p = preds.mapv(|v| v as f64);
            for mut sample in p.outer_iter_mut() {
                // 每个体素上沿类别轴 softmax, 减去最大值以保持数值稳定.
                let max = sample.fold_axis(Axis(0), f64::NEG_INFINITY, |a, b| a.max(*b));
                for mut class in sample.outer_iter_mut() {
                    Zip::from(&mut class).and(&max).for_each(|v, m| *v = (*v - m).exp());
                }
                let sum = sample.sum_axis(Axis(0));
                for mut class in sample.outer_iter_mut() {
                    Zip::from(&mut class).and(&sum).for_each(|v, s| *v /= s);
                }
            }
            p
        } else {
            preds.mapv(|v| v as f64)
        };

        let (b, c) = (probs.len_of(Axis(0)), probs.len_of(Axis(1)));
        let mut total = 0.0;
        for (p, t) in probs.outer_iter().zip(targets.outer_iter()) {
            for (p, t) in p.outer_iter().zip(t.outer_iter()) {
                let (mut inter, mut sum) = (0.0, 0.0);
                Zip::from(&p).and(&t).for_each(|p, t| {
                    let t = *t as f64;
                    inter += p * t;
                    sum += p + t;
                });
                total += 1.0 - (2.0 * inter + self.smooth_nr) / (sum + self.smooth_dr);
            }
        }
        Ok(total / (b * c) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array5;

    fn half_split() -> Array5<f32> {
        // 两个类别, 每个占一半体素.
        Array5::from_shape_fn((1, 2, 2, 2, 2), |(_, c, i, _, _)| (c == i) as u8 as f32)
    }

    #[test]
    fn test_perfect_and_inverse() {
        let t = half_split();
        let loss = DiceLoss::default();
        assert_abs_diff_eq!(loss.loss(t.view(), t.view()).unwrap(), 0.0, epsilon = 1e-6);

        let inverse = t.mapv(|v| 1.0 - v);
        assert_abs_diff_eq!(
            loss.loss(inverse.view(), t.view()).unwrap(),
            1.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_softmax_of_uniform_logits() {
        let t = half_split();
        let logits = Array5::<f32>::zeros(t.raw_dim());
        // softmax 后处处为 0.5: I = 2, P + T = 8, 损失约为 0.5.
        let v = DiceLoss::with_softmax().loss(logits.view(), t.view()).unwrap();
        assert_abs_diff_eq!(v, 0.5, epsilon = 1e-5);

        // 大 logits 不会溢出.
        let big = t.mapv(|v| v * 1e4);
        let v = DiceLoss::with_softmax().loss(big.view(), t.view()).unwrap();
        assert!(v.is_finite());
        assert_abs_diff_eq!(v, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array5::<f32>::zeros((1, 2, 2, 2, 2));
        let b = Array5::<f32>::zeros((1, 3, 2, 2, 2));
        assert!(DiceLoss::default().loss(a.view(), b.view()).is_err());
    }
}
