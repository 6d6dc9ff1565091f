//! ROI 统计: 各区带的像素数, 物理面积, 两个标记物通道的强度和与均值.
//!
//! 统计只读取存储, 不写入任何内容, 因此可以在只读模式打开的存储上运行.

use log::debug;
use ndarray::{Array3, ArrayView2, Axis};
use serde_json::Value;

use crate::consts::{channel, key};
use crate::stats::{count_true, masked_sum, mean_of};
use crate::{ApicalType, PipelineConfig, Result, RoiId, Store};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单个通道在某个区带内的强度统计.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelStats {
    /// 强度和.
    pub sum: u64,

    /// 强度均值. 区带为空时没有定义.
    pub mean: Option<f64>,
}

/// 某个区带的统计.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZoneStats {
    /// 像素个数.
    pub pixels: u64,

    /// 物理面积, 即像素个数乘以像素尺寸.
    pub area: f64,

    /// 按 [`channel::MARKERS`] 顺序排列的通道统计.
    pub channels: [ChannelStats; 2],
}

impl ZoneStats {
    /// 统计原始图像 `raw` 在区带 `zone` 内的各项指标.
    ///
    /// `zone` 与原始图像的高宽不一致时返回 [`crate::Error::ShapeMismatch`].
    pub fn measure(raw: &Array3<u16>, zone: ArrayView2<bool>, cfg: &PipelineConfig) -> Result<Self> {
        let pixels = count_true(zone);
        let mut channels = [ChannelStats { sum: 0, mean: None }; 2];
        for (out, ch) in channels.iter_mut().zip(channel::MARKERS) {
            let sum = masked_sum(raw.index_axis(Axis(2), ch), zone)?;
            *out = ChannelStats {
                sum,
                mean: mean_of(sum, pixels),
            };
        }
        Ok(Self {
            pixels,
            area: cfg.area_of(pixels),
            channels,
        })
    }
}

/// 单个 ROI 的统计记录.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiRecord {
    /// ROI 身份.
    pub roi: RoiId,

    /// 整个组织掩膜.
    pub whole: ZoneStats,

    /// 外区带.
    pub outer: ZoneStats,

    /// 内区带. apical-out ROI 没有内区带, 此时为 `None` (不适用, 而不是 0).
    pub inner: Option<ZoneStats>,
}

/// 输出列名中两个标记物通道的前缀, 按 [`channel::MARKERS`] 顺序排列.
const CHANNEL_PREFIXES: [&str; 2] = ["cy3", "af647"];

impl RoiRecord {
    /// 转换为有序的 `(列名, 值)` 表格行. 同一 apical 类型的所有 ROI 列集合一致,
    /// 不适用或没有定义的字段为 `null`, 不会省略.
    pub fn to_row(&self) -> Vec<(String, Value)> {
        let mut row: Vec<(String, Value)> = Vec::with_capacity(21);
        let mut push = |k: String, v: Value| row.push((k, v));

        push("roi_name".into(), self.roi.name().into());
        push("mix_name".into(), self.roi.mix().as_str().into());
        push("apical_type".into(), self.roi.apical().as_str().into());
        for (prefix, zone) in [("roi", Some(&self.whole)), ("oz", Some(&self.outer)), ("iz", self.inner.as_ref())] {
            push(format!("{prefix}_pixels"), zone.map(|z| z.pixels).into());
            push(format!("{prefix}_area"), zone.map(|z| z.area).into());
        }
        for (k, prefix) in CHANNEL_PREFIXES.iter().enumerate() {
            for (suffix, zone) in [("", Some(&self.whole)), ("_oz", Some(&self.outer)), ("_iz", self.inner.as_ref())] {
                let ch = zone.map(|z| z.channels[k]);
                push(format!("{prefix}{suffix}_id"), ch.map(|c| c.sum).into());
                push(format!("{prefix}{suffix}_mean"), ch.and_then(|c| c.mean).into());
            }
        }
        row
    }
}

/// 统计一个已完成分割与区带生成的 ROI.
///
/// apical-in ROI 需要 `mask`, `zones/outer` 与 `zones/inner`; apical-out ROI 需要
/// `mask` 与 `zones/outer`. 任何一个缺失都返回 [`crate::Error::NotFound`].
pub fn analyze_roi(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<RoiRecord> {
    let raw = roi.read_raw(store)?;
    let mask = roi.read_segmentation_mask(store, key::MASK)?;
    let outer = roi.read_zone_mask(store, key::OUTER)?;
    let inner = match roi.apical() {
        ApicalType::ApicalIn => Some(roi.read_zone_mask(store, key::INNER)?),
        ApicalType::ApicalOut => None,
    };

    let record = RoiRecord {
        roi: roi.clone(),
        whole: ZoneStats::measure(&raw, mask.view(), cfg)?,
        outer: ZoneStats::measure(&raw, outer.view(), cfg)?,
        inner: inner
            .map(|m| ZoneStats::measure(&raw, m.view(), cfg))
            .transpose()?,
    };
    debug!(
        "{roi}: 组织 {} 像素, 外区带 {} 像素",
        record.whole.pixels, record.outer.pixels
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::ingest_raw;
    use crate::store::Attrs;
    use crate::OpenMode;
    use ndarray::{s, Array2};

    fn setup(name: &str) -> (tempfile::TempDir, Store, RoiId) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let roi = RoiId::parse("mix_1", name).unwrap();
        let mut raw = Array3::<u16>::zeros((4, 4, 3));
        raw.slice_mut(s![.., .., 1]).fill(10);
        raw.slice_mut(s![.., .., 2]).fill(3);
        raw[[0, 0, 1]] = 30;
        ingest_raw(&store, &roi, &raw, &PipelineConfig::default()).unwrap();
        (dir, store, roi)
    }

    fn write(store: &Store, key: &str, m: &Array2<bool>) {
        store.write(key, m, &Attrs::new()).unwrap();
    }

    #[test]
    fn test_apical_in_record() {
        let (_dir, store, roi) = setup("x_in_1");
        let cfg = PipelineConfig::default();
        let mut mask = Array2::from_elem((4, 4), false);
        mask.slice_mut(s![0..2, ..]).fill(true);
        let mut outer = Array2::from_elem((4, 4), false);
        outer[[0, 0]] = true;
        let inner = Array2::from_elem((4, 4), false);
        write(&store, &roi.segmentation_key("mask"), &mask);
        write(&store, &roi.zone_key("outer"), &outer);

        assert!(analyze_roi(&store, &roi, &cfg).unwrap_err().is_not_found());
        write(&store, &roi.zone_key("inner"), &inner);

        let rec = analyze_roi(&store, &roi, &cfg).unwrap();
        assert_eq!(rec.whole.pixels, 8);
        assert_eq!(rec.whole.area, 8.0 * 0.325);
        assert_eq!(rec.whole.channels[0].sum, 7 * 10 + 30);
        assert_eq!(rec.whole.channels[0].mean, Some(12.5));
        assert_eq!(rec.whole.channels[1].sum, 24);
        assert_eq!(rec.outer.channels[0].sum, 30);

        // 内区带为空: 像素数与强度和为 0, 均值没有定义.
        let iz = rec.inner.unwrap();
        assert_eq!((iz.pixels, iz.area), (0, 0.0));
        assert_eq!(iz.channels[1], ChannelStats { sum: 0, mean: None });

        let row = rec.to_row();
        let get = |k: &str| row.iter().find(|(c, _)| c == k).map(|(_, v)| v.clone()).unwrap();
        assert_eq!(get("roi_name"), "x_in_1");
        assert_eq!(get("mix_name"), "mix_1");
        assert_eq!(get("iz_pixels"), 0);
        assert_eq!(get("cy3_iz_id"), 0);
        assert_eq!(get("cy3_iz_mean"), Value::Null);
        assert_eq!(get("af647_oz_id"), 3);
    }

    #[test]
    fn test_apical_out_has_no_inner() {
        let (_dir, store, roi) = setup("x_out_1");
        let cfg = PipelineConfig::default();
        let all = Array2::from_elem((4, 4), true);
        write(&store, &roi.segmentation_key("mask"), &all);
        write(&store, &roi.zone_key("outer"), &all);

        let rec = analyze_roi(&store, &roi, &cfg).unwrap();
        assert!(rec.inner.is_none());
        let row = rec.to_row();
        let names: Vec<&str> = row.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(&names[..5], ["roi_name", "mix_name", "apical_type", "roi_pixels", "roi_area"]);
        assert_eq!(names.len(), 21);
        for (c, v) in row.iter() {
            assert_eq!(c.contains("iz"), v.is_null(), "{c}");
        }
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let (_dir, store, roi) = setup("y_out_1");
        let small = Array2::from_elem((2, 2), true);
        write(&store, &roi.segmentation_key("mask"), &small);
        write(&store, &roi.zone_key("outer"), &small);
        let err = analyze_roi(&store, &roi, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, crate::Error::ShapeMismatch { .. }));
    }
}
