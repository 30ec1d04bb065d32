//! 分割评价指标.
//!
//! 所有函数的输入均为 `(batch, class, H, W, D)` 形状的张量, 类别轴为第 1 轴.
//! 预测和真值的形状必须一致, 类别轴和空间轴都不能为空, 否则返回 `Err`.
//!
//! 所有指标都是纯函数, 累加在 `f64` 上进行.

use crate::consts::METRIC_EPS;
use crate::data::resample::argmax_indices;
use crate::error::{ShapeError, ValidationError};
use itertools::izip;
use ndarray::{Array2, Array5, ArrayView4, ArrayView5, Axis};

/// 类别轴.
const CLASS_AXIS: Axis = Axis(1);

fn check_shapes(preds: &ArrayView5<f32>, targets: &ArrayView5<f32>) -> Result<(), ShapeError> {
    if preds.shape() != targets.shape() {
        return Err(ShapeError::Mismatch {
            left: preds.shape().to_vec(),
            right: targets.shape().to_vec(),
        });
    }
    if preds.shape()[1..].contains(&0) {
        return Err(ShapeError::Empty);
    }
    Ok(())
}

/// 单个类别上的 (tp, fp, fn) 计数, 对软预测同样适用.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Overlap {
    tp: f64,
    fp: f64,
    fn_: f64,
}

impl Overlap {
    fn of(pred: ArrayView4<f32>, target: ArrayView4<f32>) -> Self {
        let mut ans = Self::default();
        for (p, t) in izip!(pred.iter(), target.iter()) {
            let (p, t) = (*p as f64, *t as f64);
            ans.tp += p * t;
            ans.fp += p * (1.0 - t);
            ans.fn_ += t * (1.0 - p);
        }
        ans
    }

    /// 每个类别一个.
    fn per_class(preds: ArrayView5<f32>, targets: ArrayView5<f32>) -> Vec<Self> {
        izip!(preds.axis_iter(CLASS_AXIS), targets.axis_iter(CLASS_AXIS))
            .map(|(p, t)| Self::of(p, t))
            .collect()
    }
}

/// 每个类别的 Dice 系数 `2|P∩T| / (|P| + |T| + eps)`.
///
/// 某类别在预测和真值中都不存在时, 其 Dice 为 0.
pub fn dice_score(preds: ArrayView5<f32>, targets: ArrayView5<f32>) -> Result<Vec<f64>, ShapeError> {
    check_shapes(&preds, &targets)?;
    Ok(izip!(preds.axis_iter(CLASS_AXIS), targets.axis_iter(CLASS_AXIS))
        .map(|(p, t)| {
            let (mut inter, mut sum) = (0.0f64, 0.0f64);
            for (p, t) in izip!(p.iter(), t.iter()) {
                inter += *p as f64 * *t as f64;
                sum += *p as f64 + *t as f64;
            }
            2.0 * inter / (sum + METRIC_EPS)
        })
        .collect())
}

/// 各类别 Dice 的算术平均. 空输入返回 `None`.
pub fn mean_dice(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// 每个类别的 (recall, precision).
///
/// `recall = tp / (tp + fn + eps)`, `precision = tp / (tp + fp + eps)`.
pub fn recall_precision(
    preds: ArrayView5<f32>,
    targets: ArrayView5<f32>,
) -> Result<(Vec<f64>, Vec<f64>), ShapeError> {
    check_shapes(&preds, &targets)?;
    Ok(Overlap::per_class(preds, targets)
        .into_iter()
        .map(|o| {
            (
                o.tp / (o.tp + o.fn_ + METRIC_EPS),
                o.tp / (o.tp + o.fp + METRIC_EPS),
            )
        })
        .unzip())
}

/// 肿瘤类别的加权召回率 `Σ weights[i] * recall[i + 1]`.
///
/// 背景类 (第 0 类) 不参与计算, 因此 `weights` 长度必须为 `recall.len() - 1`.
pub fn weighted_recall(recall: &[f64], weights: &[f64]) -> Result<f64, ValidationError> {
    let expected = recall.len().saturating_sub(1);
    if recall.is_empty() || weights.len() != expected {
        return Err(ValidationError::WeightLength {
            weights: weights.len(),
            expected,
        });
    }
    Ok(izip!(weights, &recall[1..]).map(|(w, r)| w * r).sum())
}

/// 沿类别轴取 arg-max 后的混淆矩阵, 行为真值类别, 列为预测类别.
///
/// 矩阵大小固定为 `num_classes × num_classes`, 即使某些类别从未出现.
/// 并列时取较小的类别.
pub fn confusion_matrix(
    preds: ArrayView5<f32>,
    targets: ArrayView5<f32>,
) -> Result<Array2<u64>, ShapeError> {
    check_shapes(&preds, &targets)?;
    let n = preds.len_of(CLASS_AXIS);
    let mut ans = Array2::zeros((n, n));
    for (p, t) in izip!(preds.outer_iter(), targets.outer_iter()) {
        let p = argmax_indices(p).ok_or(ShapeError::Empty)?;
        let t = argmax_indices(t).ok_or(ShapeError::Empty)?;
        for (p, t) in izip!(p.iter(), t.iter()) {
            ans[(*t, *p)] += 1;
        }
    }
    Ok(ans)
}

/// 将概率张量硬化为 one-hot: 每个体素只有 arg-max 类别为 1.
///
/// 类别轴为空时返回同形状的空张量.
pub fn harden(preds: ArrayView5<f32>) -> Array5<f32> {
    let mut ans = Array5::zeros(preds.raw_dim());
    for (src, mut dst) in izip!(preds.outer_iter(), ans.outer_iter_mut()) {
        let Some(classes) = argmax_indices(src) else {
            continue;
        };
        for ((i, j, k), &c) in classes.indexed_iter() {
            dst[(c, i, j, k)] = 1.0;
        }
    }
    ans
}

/// 一次评估的全部指标.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReport {
    /// 各类别 Dice.
    pub dice: Vec<f64>,

    /// 平均 Dice.
    pub mean_dice: f64,

    /// 各类别召回率.
    pub recall: Vec<f64>,

    /// 各类别精确率.
    pub precision: Vec<f64>,

    /// 混淆矩阵. 多批结果可直接相加.
    pub confusion: Array2<u64>,
}

impl MetricReport {
    /// 计算全部指标. `preds` 可以是概率, Dice 等重叠指标直接在其上计算.
    pub fn evaluate(preds: ArrayView5<f32>, targets: ArrayView5<f32>) -> Result<Self, ShapeError> {
        let dice = dice_score(preds.view(), targets.view())?;
        let (recall, precision) = recall_precision(preds.view(), targets.view())?;
        let confusion = confusion_matrix(preds, targets)?;
        Ok(Self {
            mean_dice: mean_dice(&dice).ok_or(ShapeError::Empty)?,
            dice,
            recall,
            precision,
            confusion,
        })
    }

    /// 肿瘤类别的加权召回率.
    #[inline]
    pub fn weighted_recall(&self, weights: &[f64]) -> Result<f64, ValidationError> {
        weighted_recall(&self.recall, weights)
    }

    /// 混淆矩阵对角线占比.
    pub fn accuracy(&self) -> f64 {
        let total = self.confusion.sum();
        if total == 0 {
            return 0.0;
        }
        self.confusion.diag().sum() as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resample::one_hot_encode;
    use crate::data::tests::stripe_label;
    use approx::assert_abs_diff_eq;
    use ndarray::{stack, Array3};

    fn one_hot_batch(labels: &[Array3<u8>]) -> Array5<f32> {
        let hot: Vec<_> = labels
            .iter()
            .map(|l| one_hot_encode(l.view(), 4).unwrap())
            .collect();
        let views: Vec<_> = hot.iter().map(|h| h.view()).collect();
        stack(Axis(0), &views).unwrap()
    }

    #[test]
    fn test_dice_identity() {
        let t = one_hot_batch(&[stripe_label((4, 4, 8), 4), stripe_label((4, 4, 8), 4)]);
        let dice = dice_score(t.view(), t.view()).unwrap();
        assert_eq!(dice.len(), 4);
        for d in &dice {
            assert_abs_diff_eq!(*d, 1.0, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(mean_dice(&dice).unwrap(), 1.0, epsilon = 1e-6);

        let (recall, precision) = recall_precision(t.view(), t.view()).unwrap();
        for v in recall.iter().chain(&precision) {
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_dice_disjoint() {
        let t = one_hot_batch(&[Array3::zeros((3, 3, 3))]);
        let p = one_hot_batch(&[Array3::from_elem((3, 3, 3), 2)]);
        let dice = dice_score(p.view(), t.view()).unwrap();
        assert!(dice.iter().all(|d| *d == 0.0));

        let (recall, precision) = recall_precision(p.view(), t.view()).unwrap();
        assert_eq!(recall[0], 0.0);
        assert_eq!(precision[2], 0.0);
    }

    #[test]
    fn test_confusion_rows() {
        let truth = stripe_label((4, 4, 8), 4);
        // 把背景全部误判为第 3 类.
        let guess = truth.mapv(|v| if v == 0 { 3 } else { v });
        let t = one_hot_batch(&[truth.clone()]);
        let p = one_hot_batch(&[guess]);

        let m = confusion_matrix(p.view(), t.view()).unwrap();
        assert_eq!(m.dim(), (4, 4));
        for c in 0..4u8 {
            let expect = truth.iter().filter(|v| **v == c).count() as u64;
            assert_eq!(m.row(c as usize).sum(), expect);
        }
        assert_eq!(m[(0, 3)], 32);
        assert_eq!(m[(0, 0)], 0);
        assert_eq!(m.sum(), 4 * 4 * 8);

        let report = MetricReport::evaluate(p.view(), t.view()).unwrap();
        assert_eq!(report.confusion, m);
        assert_abs_diff_eq!(report.accuracy(), 0.75);
    }

    #[test]
    fn test_confusion_ties_pick_first() {
        let p = Array5::from_elem((1, 4, 2, 2, 2), 0.25f32);
        let t = one_hot_batch(&[Array3::from_elem((2, 2, 2), 1)]);
        let m = confusion_matrix(p.view(), t.view()).unwrap();
        assert_eq!(m[(1, 0)], 8);

        let hard = harden(p.view());
        assert_eq!(hard.index_axis(Axis(1), 0).sum(), 8.0);
        assert_eq!(hard.sum(), 8.0);
    }

    #[test]
    fn test_weighted_recall() {
        let recall = [0.9, 0.5, 0.6, 0.8];
        let v = weighted_recall(&recall, &[0.2, 0.3, 0.5]).unwrap();
        assert_abs_diff_eq!(v, 0.1 + 0.18 + 0.4, epsilon = 1e-12);

        assert!(matches!(
            weighted_recall(&recall, &[0.5, 0.5]),
            Err(ValidationError::WeightLength {
                weights: 2,
                expected: 3
            })
        ));
        assert!(weighted_recall(&[], &[]).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array5::<f32>::zeros((1, 4, 2, 2, 2));
        let b = Array5::<f32>::zeros((1, 4, 2, 2, 3));
        assert!(matches!(
            dice_score(a.view(), b.view()),
            Err(ShapeError::Mismatch { .. })
        ));
        assert!(MetricReport::evaluate(a.view(), b.view()).is_err());
    }

    #[test]
    fn test_empty_axes_rejected() {
        for shape in [(1, 0, 2, 2, 2), (1, 4, 0, 2, 2), (2, 4, 2, 2, 0)] {
            let x = Array5::<f32>::zeros(shape);
            assert_eq!(
                MetricReport::evaluate(x.view(), x.view()),
                Err(ShapeError::Empty),
                "{shape:?}"
            );
            assert_eq!(confusion_matrix(x.view(), x.view()), Err(ShapeError::Empty));
            assert_eq!(dice_score(x.view(), x.view()), Err(ShapeError::Empty));
        }
        assert_eq!(harden(Array5::zeros((1, 0, 2, 2, 2)).view()).len(), 0);
    }

    #[test]
    fn test_many_classes() {
        // 300 个类别, 超出 u8 范围.
        let mut t = Array5::<f32>::zeros((1, 300, 1, 1, 2));
        t[(0, 299, 0, 0, 0)] = 1.0;
        t[(0, 43, 0, 0, 1)] = 1.0;
        let m = confusion_matrix(t.view(), t.view()).unwrap();
        assert_eq!(m.dim(), (300, 300));
        assert_eq!(m[(299, 299)], 1);
        assert_eq!(m[(43, 43)], 1);
        assert_eq!(m.sum(), 2);

        let hard = harden(t.view());
        assert_eq!(hard, t);
    }
}
