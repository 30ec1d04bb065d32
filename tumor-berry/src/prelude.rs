//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::config::{
    DataPaths, LoaderConfig, Normalization, PipelineConfig, RunMode, ShortDepth, SplitConfig,
    TrainConfig,
};
pub use crate::consts::class::{BACKGROUND, EDEMA, ENHANCING_TUMOR, NON_ENHANCING_TUMOR};
pub use crate::consts::{DEFAULT_INPUT_SIZE, VIEWER_IMAGE_SIZE};

pub use crate::data::{
    DepthWindow, IntensityWindow, MriData, MriLabel, MriVolume, NiftiDirs, NiftiHeaderAttr,
    Resampler, TensorPair, VolumeSource,
};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{Batch, DataLoader, DataModule, Dataset, Order, Split, SplitDatasets, Stage};

pub use crate::error::{Error, Result};

pub use crate::metrics::MetricReport;

pub use crate::model::{
    fit, AdamW, BestCheckpoint, DiceLoss, Ensemble, FitSummary, LossFn, ModelAdapter,
    SegmentationNetwork, Segmenter,
};

pub use crate::viewer::{SlicePair, ViewerSession};
