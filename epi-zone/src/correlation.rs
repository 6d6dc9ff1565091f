//! 通道相关性.
//!
//! 每个 ROI 划分为若干相关性区带:
//!
//! | apical 类型 | whole_roi | apical                        | basal  |
//! |-------------|-----------|-------------------------------|--------|
//! | apical-in   | 组织掩膜  | 人工内区带 (如有), 否则内区带 | 外区带 |
//! | apical-out  | 组织掩膜  | 外区带                        | 不输出 |
//!
//! 每个区带输出一条记录, 包含两个标记物通道的强度和, 面积归一化强度, 细胞核数归一化
//! 强度, 以及两个通道之间的 Pearson 相关系数.

use std::fmt;

use log::{debug, warn};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde_json::Value;

use crate::consts::{channel, key};
use crate::nuclei::{count_in_zone, read_nuclei};
use crate::stats::{count_true, masked_sum, pearson};
use crate::{ApicalType, PipelineConfig, Result, RoiId, Store};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 相关性区带.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CorrelationZone {
    /// 整个组织掩膜.
    WholeRoi,

    /// 顶端侧.
    Apical,

    /// 基底侧.
    Basal,
}

impl CorrelationZone {
    /// 输出中的区带名.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CorrelationZone::WholeRoi => "whole_roi",
            CorrelationZone::Apical => "apical",
            CorrelationZone::Basal => "basal",
        }
    }
}

impl fmt::Display for CorrelationZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个通道在某个相关性区带内的强度指标.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelMetrics {
    /// 强度和.
    pub total_intensity: u64,

    /// 强度和除以区带物理面积. 区带为空时没有定义.
    pub normalized_intensity_area: Option<f64>,

    /// 强度和除以与区带重叠的细胞核个数. 没有细胞核时没有定义.
    pub normalized_intensity_nuclei: Option<f64>,
}

/// 一个 `(ROI, 相关性区带)` 的记录.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrelationRecord {
    /// ROI 身份.
    pub roi: RoiId,

    /// 相关性区带.
    pub zone: CorrelationZone,

    /// 区带像素个数.
    pub pixels: u64,

    /// 与区带重叠的细胞核个数.
    pub nuclei: u64,

    /// 按 [`channel::MARKERS`] 顺序排列的通道指标.
    pub channels: [ChannelMetrics; 2],

    /// 两个标记物通道在区带内的 Pearson 相关系数. 像素不足或方差为 0 时为 0.
    pub correlation: f64,
}

impl CorrelationRecord {
    /// 转换为有序的 `(列名, 值)` 表格行. 通道列名使用 mix 对应的标记物名称,
    /// 没有定义的指标为 `null`.
    pub fn to_row(&self) -> Vec<(String, Value)> {
        let names = self.roi.mix().channel_names();
        let mut row: Vec<(String, Value)> = vec![
            ("roi".into(), self.roi.name().into()),
            ("mix".into(), self.roi.mix().as_str().into()),
            ("roi_type".into(), self.roi.apical().as_str().into()),
            ("zone".into(), self.zone.as_str().into()),
        ];
        for (name, m) in names.iter().zip(self.channels.iter()) {
            row.push((format!("{name}_total_intensity"), m.total_intensity.into()));
            row.push((
                format!("{name}_normalized_intensity_area"),
                m.normalized_intensity_area.into(),
            ));
            row.push((
                format!("{name}_normalized_intensity_nuclei"),
                m.normalized_intensity_nuclei.into(),
            ));
        }
        row.push((
            format!("{}_{}_correlation", names[0], names[1]),
            self.correlation.into(),
        ));
        row
    }
}

/// 按输出顺序获取 ROI 的所有相关性区带掩膜.
///
/// 所需掩膜缺失时返回 [`crate::Error::NotFound`]. 人工内区带是可选的.
pub fn zone_masks(store: &Store, roi: &RoiId) -> Result<Vec<(CorrelationZone, Array2<bool>)>> {
    let mask = roi.read_segmentation_mask(store, key::MASK)?;
    let outer = roi.read_zone_mask(store, key::OUTER)?;
    Ok(match roi.apical() {
        ApicalType::ApicalIn => {
            let apical = if store.is_array(&roi.zone_key(key::INNER_MANUAL)) {
                debug!("{roi}: 使用人工内区带");
                roi.read_zone_mask(store, key::INNER_MANUAL)?
            } else {
                roi.read_zone_mask(store, key::INNER)?
            };
            vec![
                (CorrelationZone::WholeRoi, mask),
                (CorrelationZone::Apical, apical),
                (CorrelationZone::Basal, outer),
            ]
        }
        ApicalType::ApicalOut => vec![
            (CorrelationZone::WholeRoi, mask),
            (CorrelationZone::Apical, outer),
        ],
    })
}

/// 计算单个区带的相关性记录.
pub fn correlate_zone(
    roi: &RoiId,
    zone: CorrelationZone,
    raw: &Array3<u16>,
    nuclei: ArrayView2<u32>,
    mask: ArrayView2<bool>,
    cfg: &PipelineConfig,
) -> Result<CorrelationRecord> {
    let pixels = count_true(mask);
    let n_nuclei = count_in_zone(nuclei, mask)?;
    let area = cfg.area_of(pixels);

    let mut channels = [ChannelMetrics {
        total_intensity: 0,
        normalized_intensity_area: None,
        normalized_intensity_nuclei: None,
    }; 2];
    for (out, ch) in channels.iter_mut().zip(channel::MARKERS) {
        let total = masked_sum(raw.index_axis(Axis(2), ch), mask)?;
        *out = ChannelMetrics {
            total_intensity: total,
            normalized_intensity_area: (pixels > 0).then(|| total as f64 / area),
            normalized_intensity_nuclei: (n_nuclei > 0).then(|| total as f64 / n_nuclei as f64),
        };
    }
    let [c1, c2] = channel::MARKERS;
    let correlation = pearson(
        raw.index_axis(Axis(2), c1),
        raw.index_axis(Axis(2), c2),
        mask,
    )?;

    if pixels == 0 {
        warn!("{roi}: 区带 {zone} 为空");
    }
    Ok(CorrelationRecord {
        roi: roi.clone(),
        zone,
        pixels,
        nuclei: n_nuclei,
        channels,
        correlation,
    })
}

/// 计算 ROI 所有相关性区带的记录. 需要原始图像, 组织掩膜, 区带与细胞核标签.
///
/// 任何所需数组缺失都返回 [`crate::Error::NotFound`].
pub fn correlate_roi(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<Vec<CorrelationRecord>> {
    let raw = roi.read_raw(store)?;
    let nuclei = read_nuclei(store, roi)?;
    zone_masks(store, roi)?
        .into_iter()
        .map(|(zone, mask)| correlate_zone(roi, zone, &raw, nuclei.view(), mask.view(), cfg))
        .collect()
}
