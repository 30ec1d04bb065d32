#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供脑肿瘤多模态 MRI 数据集 (BraTS 组织方式) 的读取, 重采样, 划分,
//! 批加载, 分割评价与结果可视化.
//!
//! 分割网络本身由外部框架实现. 本 crate 通过 [`model::Segmenter`] 和
//! [`model::SegmentationNetwork`] 约定网络能力, 并负责其余全部流程.
//!
//! # 注意
//!
//! 1. 该 crate 假设数据按 `imagesTr/` 与 `labelsTr/` 两个目录组织, 两者文件名一一对应.
//! 2. 扫描为 `(h, w, d, 模态)` 的 4D NIfTI, 标注为 `(h, w, d)` 的 3D NIfTI,
//!   取值 0 (背景), 1 (水肿), 2 (非增强肿瘤), 3 (增强肿瘤).
//! 3. 可失败的操作都返回 [`error::Result`], 库代码不会因为数据问题而 panic.
//!
//! # 功能
//!
//! ### NIfTI 读取 ✅
//!
//! 实现位于 `tumor-berry/src/data`.
//!
//! ### 深度居中裁剪, 平面缩放, 规范化, one-hot 编码 ✅
//!
//! 平面缩放沿用 OpenCV 的采样约定.
//!
//! 实现位于 `tumor-berry/src/data/resize.rs` 与 `tumor-berry/src/data/resample.rs`.
//!
//! ### 训练/验证/测试划分与批加载 ✅
//!
//! 先划出 20% 作为验证集, 再从剩余部分划出 15% 作为测试集.
//! 打开 `rayon` feature 时同一批的样本并行加载.
//!
//! 实现位于 `tumor-berry/src/dataset`.
//!
//! ### 训练包装, Dice 损失, 最优权重保存, 均值集成 ✅
//!
//! 实现位于 `tumor-berry/src/model`.
//!
//! ### Dice, 召回率, 精确率, 混淆矩阵 ✅
//!
//! 实现位于 `tumor-berry/src/metrics.rs`.
//!
//! ### 切片查看器 ✅
//!
//! 实现位于 `tumor-berry/src/viewer`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

pub mod config;
pub mod consts;

/// 3D/4D MRI nii 文件基础数据结构与重采样.
pub mod data;

pub use data::{MriData, MriLabel, MriVolume, NiftiDirs, NiftiHeaderAttr, VolumeSource};

pub mod dataset;
pub mod error;
pub mod metrics;
pub mod model;
pub mod prelude;
pub mod viewer;

pub use error::{Error, Result};
