//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx2d;

pub use crate::analysis::{analyze_roi, ChannelStats, RoiRecord, ZoneStats};
pub use crate::batch::{
    fan_out, process_roi, run_analysis, run_correlation, run_nuclei, run_segmentation, run_zoning,
    JobReport,
};
pub use crate::correlation::{correlate_roi, ChannelMetrics, CorrelationRecord, CorrelationZone};
pub use crate::nuclei::{segment_nuclei, IntensityOracle, NucleiOracle};
pub use crate::roi::{ingest_raw, list_rois};
pub use crate::store::Attrs;
pub use crate::zone::save_overlay;

pub use crate::{ApicalType, Error, Mix, OpenMode, OverlayStyle, PipelineConfig, Result, RoiId, Store};
