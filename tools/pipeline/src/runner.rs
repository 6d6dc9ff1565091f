//! 程序运行函数.

use std::env;
use std::path::PathBuf;

use epi_zone::batch::{fan_out, process_roi, run_correlation};
use epi_zone::consts::key;
use epi_zone::roi::list_rois;
use epi_zone::{OpenMode, Result};
use log::info;
use utils::loader;

use crate::result::PipelineResult;

/// 结果表输出目录环境变量.
const OUTPUT_ENV: &str = "EPI_ZONE_OUTPUT";

/// 结果表输出目录. `$EPI_ZONE_OUTPUT` 为空时为当前目录.
pub fn output_dir() -> PathBuf {
    env::var(OUTPUT_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

/// 实际运行.
///
/// 细胞核标签由外部模型预先写入存储. 已有 `segmentation/nuclei` 的 ROI
/// 才会计算相关性, 其余 ROI 只做统计.
pub fn run() -> Result<PipelineResult> {
    let store = loader::open_store_from_env_or_home(OpenMode::ReadWrite)?;
    let cfg = loader::config_from_env()?;
    cfg.validate()?;

    let rois = list_rois(&store)?;
    info!(
        "Running pipeline on {} ROIs in {} with {} threads...",
        rois.len(),
        store.path().display(),
        utils::cpus()
    );

    let reports = fan_out(&rois, |roi| {
        let record = process_roi(&store, roi, &cfg)?;
        let correlation = if store.is_array(&roi.segmentation_key(key::NUCLEI)) {
            Some(run_correlation(&store, roi, &cfg)?)
        } else {
            None
        };
        Ok((record, correlation))
    });
    Ok(PipelineResult::from_reports(reports))
}
