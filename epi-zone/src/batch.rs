//! 批处理: 以 ROI 为单位扇出各阶段.
//!
//! 不同 ROI 之间没有依赖, 只写入各自的子树, 因此可以放心地并行. 单个 ROI 内的各阶段
//! 则必须严格按 "分割 -> 区带 -> 统计" 的顺序执行, 这一顺序由 [`process_roi`]
//! 保证, 而不是依赖存储中恰好已有的状态.

use log::{info, warn};

use crate::analysis::{analyze_roi, RoiRecord};
use crate::correlation::{correlate_roi, CorrelationRecord};
use crate::nuclei::{segment_nuclei, NucleiOracle};
use crate::segment::{segment_apical_in, segment_apical_out};
use crate::zone::{generate_apical_in_zones, generate_apical_out_zones};
use crate::{ApicalType, PipelineConfig, Result, RoiId, Store};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 单个 ROI 上一次作业的结果. 失败不会中断其他 ROI 的作业.
#[derive(Debug)]
pub struct JobReport<T> {
    /// ROI 身份.
    pub roi: RoiId,

    /// 作业结果.
    pub outcome: Result<T>,
}

impl<T> JobReport<T> {
    /// 作业是否成功.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// 对每个 ROI 执行 `job`, 按输入顺序返回每个 ROI 的结果.
///
/// 打开 `rayon` feature 时并行执行.
pub fn fan_out<T, F>(rois: &[RoiId], job: F) -> Vec<JobReport<T>>
where
    T: Send,
    F: Fn(&RoiId) -> Result<T> + Sync + Send,
{
    let run = |roi: &RoiId| {
        let outcome = job(roi);
        if let Err(e) = outcome.as_ref() {
            warn!("{roi}: {e}");
        }
        JobReport {
            roi: roi.clone(),
            outcome,
        }
    };
    let reports: Vec<JobReport<T>> = {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                rois.par_iter().map(run).collect()
            } else {
                rois.iter().map(run).collect()
            }
        }
    };
    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    info!("完成 {} 个 ROI, 其中 {failed} 个失败", reports.len());
    reports
}

/// 按 apical 类型分割 ROI.
pub fn run_segmentation(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<()> {
    match roi.apical() {
        ApicalType::ApicalIn => segment_apical_in(store, roi, cfg).map(drop),
        ApicalType::ApicalOut => segment_apical_out(store, roi, cfg).map(drop),
    }
}

/// 按 apical 类型生成 ROI 的区带.
pub fn run_zoning(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<()> {
    match roi.apical() {
        ApicalType::ApicalIn => generate_apical_in_zones(store, roi, cfg).map(drop),
        ApicalType::ApicalOut => generate_apical_out_zones(store, roi, cfg).map(drop),
    }
}

/// 统计 ROI.
#[inline]
pub fn run_analysis(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<RoiRecord> {
    analyze_roi(store, roi, cfg)
}

/// 细胞核分割.
#[inline]
pub fn run_nuclei<O>(store: &Store, roi: &RoiId, oracle: &O, cfg: &PipelineConfig) -> Result<()>
where
    O: NucleiOracle + ?Sized,
{
    segment_nuclei(store, roi, oracle, cfg).map(drop)
}

/// 计算 ROI 的通道相关性.
#[inline]
pub fn run_correlation(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<Vec<CorrelationRecord>> {
    correlate_roi(store, roi, cfg)
}

/// 依次执行分割, 区带生成与统计. 任何一步失败都会立即返回, 后续步骤不会执行.
pub fn process_roi(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<RoiRecord> {
    run_segmentation(store, roi, cfg)?;
    run_zoning(store, roi, cfg)?;
    run_analysis(store, roi, cfg)
}
