//! 训练模式: 划分数据集, 并把重采样后的张量导出为 npz 供外部训练框架读取.
//!
//! 输出目录结构:
//!
//! ```text
//! {out}/train/{id}.npz
//! {out}/validation/{id}.npz
//! {out}/test/{id}.npz
//! {out}/{stage}.txt      (每行一个样本 id)
//! ```

use ndarray::Axis;
use std::fs;
use std::path::Path;
use tumor_berry::prelude::*;

/// 划分种子环境变量.
pub const SEED_ENV: &str = "TUMOR_BERRY_SEED";

/// 导出目录环境变量.
pub const OUTPUT_DIR_ENV: &str = "TUMOR_BERRY_OUTPUT_DIR";

/// 一个阶段的导出统计.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStats {
    /// 样本个数.
    pub samples: usize,

    /// 各类别体素个数.
    pub class_voxels: Vec<u64>,
}

impl StageStats {
    /// 各类别体素占比.
    pub fn class_ratios(&self) -> Vec<f64> {
        let total: u64 = self.class_voxels.iter().sum();
        self.class_voxels
            .iter()
            .map(|&n| if total == 0 { 0.0 } else { n as f64 / total as f64 })
            .collect()
    }
}

/// 把某一阶段的全部样本导出到 `dir`.
pub fn export_stage<S: VolumeSource>(
    dataset: &Dataset<S>,
    dir: &Path,
    loader: &LoaderConfig,
) -> Result<StageStats> {
    fs::create_dir_all(dir)?;
    let mut stats = StageStats {
        samples: 0,
        class_voxels: vec![0; dataset.resampler().config().num_classes],
    };
    for batch in dataset.loader(loader, Order::Sequential)? {
        let batch = batch?;
        for (k, id) in batch.ids.iter().enumerate() {
            let image = batch.inputs.index_axis(Axis(0), k).to_owned();
            let label = batch.targets.index_axis(Axis(0), k).to_owned();
            let counts = label.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(1));
            for (acc, n) in stats.class_voxels.iter_mut().zip(counts.iter()) {
                *acc += *n as u64;
            }
            TensorPair::new(image, label)?.save_npz(dir.join(format!("{}.npz", stem(id))))?;
            stats.samples += 1;
        }
    }
    Ok(stats)
}

/// 去掉 `.nii` / `.nii.gz` 后缀.
fn stem(id: &str) -> &str {
    let id = id.strip_suffix(".gz").unwrap_or(id);
    id.strip_suffix(".nii").unwrap_or(id)
}

/// 划分并导出全部阶段.
pub fn export_all<S: VolumeSource>(
    module: &DataModule<S>,
    split: &SplitConfig,
    out: &Path,
    loader: &LoaderConfig,
) -> Result<Vec<(Stage, StageStats)>> {
    let sets = module.setup(split)?;
    let mut ans = Vec::with_capacity(Stage::ALL.len());
    for stage in Stage::ALL {
        let ids = sets.split.get(stage);
        fs::create_dir_all(out)?;
        fs::write(out.join(format!("{}.txt", stage.name())), ids.join("\n"))?;

        let stats = export_stage(sets.get(stage), &out.join(stage.name()), loader)?;
        crate::sep();
        log::info!("{}: {} samples", stage.name(), stats.samples);
        for (c, r) in stats.class_ratios().iter().enumerate() {
            log::info!("  class {c}: {:.4}%", r * 100.0);
        }
        ans.push((stage, stats));
    }
    Ok(ans)
}

/// 实际运行.
pub fn run() -> Result<()> {
    let paths = DataPaths::from_env_or_home()?;
    log::info!(
        "images from `{}`, labels from `{}`",
        paths.image_dir.display(),
        paths.label_dir.display()
    );
    let module = DataModule::new(NiftiDirs::new(paths), PipelineConfig::default())?;
    let split = SplitConfig {
        seed: crate::parse_var(SEED_ENV)?,
        ..Default::default()
    };
    let loader = LoaderConfig {
        num_workers: crate::cpus(),
        ..Default::default()
    };
    let out = crate::dir_var_or(OUTPUT_DIR_ENV, "prepared");
    export_all(&module, &split, &out, &loader)?;
    log::info!("exported to `{}`", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Synthetic;

    impl VolumeSource for Synthetic {
        fn sample_ids(&self) -> Result<Vec<String>> {
            Ok((0..6).map(|i| format!("BRATS_{i:03}.nii.gz")).collect())
        }

        fn fetch(&self, _id: &str) -> Result<MriData> {
            let volume = ndarray::Array4::from_shape_fn((4, 4, 4, 4), |(i, j, k, c)| {
                (i + j + k + c) as f32
            });
            let label = ndarray::Array3::from_shape_fn((4, 4, 4), |(i, _, _)| (i % 4) as u8);
            MriData::new(MriVolume::from_array(volume), MriLabel::from_array(label))
        }
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("BRATS_001.nii.gz"), "BRATS_001");
        assert_eq!(stem("BRATS_001.nii"), "BRATS_001");
        assert_eq!(stem("BRATS_001.gz"), "BRATS_001");
        assert_eq!(stem("BRATS_001"), "BRATS_001");
    }

    #[test]
    fn test_export_all() {
        let config = PipelineConfig {
            height: 4,
            width: 4,
            depth: 4,
            ..Default::default()
        };
        let module = DataModule::new(Synthetic, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let split = SplitConfig {
            seed: Some(0),
            ..Default::default()
        };
        let loader = LoaderConfig {
            batch_size: 2,
            num_workers: 1,
        };
        let stats = export_all(&module, &split, dir.path(), &loader).unwrap();

        let total: usize = stats.iter().map(|(_, s)| s.samples).sum();
        assert_eq!(total, 6);
        for (stage, s) in &stats {
            assert_eq!(s.class_voxels, vec![16 * s.samples as u64; 4]);
            let listed = fs::read_to_string(dir.path().join(format!("{}.txt", stage.name()))).unwrap();
            for id in listed.lines() {
                assert!(dir.path().join(stage.name()).join(format!("{}.npz", stem(id))).exists());
            }
        }
    }
}
