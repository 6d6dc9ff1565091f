//! 组织分割.
//!
//! 两类 ROI 各有一个分割器, 均以 `(存储, ROI, 配置)` 为参数, 结果写回存储中该 ROI 的
//! `segmentation` 分组. 重跑时每个结果都以原子方式整体替换, 结果逐位一致.

mod apical_in;
mod apical_out;

pub use apical_in::{compute_apical_in, segment_apical_in, ApicalInSegmentation};
pub use apical_out::{compute_apical_out, segment_apical_out};

use crate::store::Attrs;
use crate::PipelineConfig;

/// 分割结果的溯源属性.
fn provenance(cfg: &PipelineConfig, description: &str) -> Attrs {
    crate::attrs! {
        "author" => cfg.author.as_str(),
        "description" => description,
    }
}
