//! 多模型集成.

use super::Segmenter;
use crate::error::{Result, ShapeError, ValidationError};
use ndarray::{Array5, ArrayView5};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 均值集成: 各成员独立推理, 输出逐元素取平均.
///
/// 创建时所有成员切换到推理模式. 求和按成员顺序进行, 结果是确定的.
pub struct Ensemble {
    members: Vec<Box<dyn Segmenter>>,
}

impl Ensemble {
    /// 成员列表为空时返回 `Err`.
    pub fn new(mut members: Vec<Box<dyn Segmenter>>) -> Result<Self> {
        if members.is_empty() {
            return Err(ValidationError::EmptyEnsemble.into());
        }
        for m in members.iter_mut() {
            m.set_training(false);
        }
        log::info!("ensemble of {} members", members.len());
        Ok(Self { members })
    }

    /// 成员个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// 永远为 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn predict_all(&self, inputs: ArrayView5<f32>) -> Result<Vec<Array5<f32>>> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                self.members.par_iter().map(|m| m.forward(inputs.view())).collect()
            } else {
                self.members.iter().map(|m| m.forward(inputs.view())).collect()
            }
        }
    }
}

impl Segmenter for Ensemble {
    fn forward(&self, inputs: ArrayView5<f32>) -> Result<Array5<f32>> {
        let mut outputs = self.predict_all(inputs)?.into_iter();
        let mut sum = outputs.next().ok_or(ValidationError::EmptyEnsemble)?;
        for out in outputs {
            if out.shape() != sum.shape() {
                return Err(ShapeError::Mismatch {
                    left: sum.shape().to_vec(),
                    right: out.shape().to_vec(),
                }
                .into());
            }
            sum += &out;
        }
        let n = self.members.len() as f32;
        sum.mapv_inplace(|v| v / n);
        Ok(sum)
    }

    /// 集成只用于推理, 成员始终保持推理模式.
    fn set_training(&mut self, _training: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::ConstantNet;

    fn member(name: &str, scores: Vec<f32>) -> Box<dyn Segmenter> {
        Box::new(ConstantNet::new(name, scores))
    }

    #[test]
    fn test_mean_of_constants() {
        let mut ensemble = Ensemble::new(vec![
            member("zeros", vec![0.0; 4]),
            member("ones", vec![1.0; 4]),
        ])
        .unwrap();
        ensemble.set_training(true);
        let out = ensemble.forward(Array5::zeros((1, 4, 2, 2, 2)).view()).unwrap();
        assert_eq!(out.dim(), (1, 4, 2, 2, 2));
        assert!(out.iter().all(|v| *v == 0.5));
    }

    #[test]
    fn test_single_member_is_identity() {
        let ensemble = Ensemble::new(vec![member("a", vec![0.1, 0.7, 0.2])]).unwrap();
        let out = ensemble.forward(Array5::zeros((2, 4, 1, 1, 1)).view()).unwrap();
        assert_eq!(out[(1, 1, 0, 0, 0)], 0.7);
    }

    #[test]
    fn test_errors() {
        assert!(Ensemble::new(Vec::new()).is_err());

        let ensemble = Ensemble::new(vec![
            member("two", vec![0.0; 2]),
            member("three", vec![0.0; 3]),
        ])
        .unwrap();
        assert!(ensemble.forward(Array5::zeros((1, 4, 2, 2, 2)).view()).is_err());
    }
}
