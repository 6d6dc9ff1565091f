//! apical-out ROI 的分割: 任意通道非零的像素即为组织.

use log::{debug, info};
use ndarray::{Array2, ArrayView3};

use super::provenance;
use crate::consts::key;
use crate::morph::nonzero_union;
use crate::roi::check_raw_shape;
use crate::{ApicalType, PipelineConfig, Result, RoiId, Store};

/// 由原始图像计算 apical-out 组织掩膜. 全零图像得到全背景掩膜.
///
/// 原始图像不是 3 通道时返回 [`crate::Error::InvalidArgument`].
pub fn compute_apical_out(raw: ArrayView3<u16>) -> Result<Array2<bool>> {
    check_raw_shape(raw.shape())?;
    Ok(nonzero_union(raw))
}

/// 分割 apical-out ROI, 并将掩膜写入 `segmentation/mask`.
///
/// ROI 不存在时返回 [`crate::Error::NotFound`], ROI 不是 apical-out 类型时返回
/// [`crate::Error::InvalidArgument`].
pub fn segment_apical_out(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<Array2<bool>> {
    roi.expect_apical(ApicalType::ApicalOut)?;
    let raw = roi.read_raw(store)?;
    let mask = compute_apical_out(raw.view())?;
    let pixels = mask.iter().filter(|v| **v).count();
    debug!("{roi}: apical-out 掩膜共 {pixels} 个前景像素");

    store.write(
        &roi.segmentation_key(key::MASK),
        &mask,
        &provenance(cfg, "Apical-out mask"),
    )?;
    info!("{roi}: apical-out 分割完成");
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::{compute_apical_out, segment_apical_out};
    use crate::roi::ingest_raw;
    use crate::{OpenMode, PipelineConfig, RoiId, Store};
    use ndarray::{Array2, Array3};

    #[test]
    fn test_all_zero_image() {
        let raw = Array3::<u16>::zeros((8, 6, 3));
        let mask = compute_apical_out(raw.view()).unwrap();
        assert_eq!(mask, Array2::from_elem((8, 6), false));
    }

    #[test]
    fn test_wrong_channel_count() {
        let raw = Array3::<u16>::ones((4, 4, 2));
        let err = compute_apical_out(raw.view()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_segment_and_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let cfg = PipelineConfig::default();
        let roi = RoiId::parse("mix_1", "a_out_1").unwrap();

        let err = segment_apical_out(&store, &roi, &cfg).unwrap_err();
        assert!(err.is_not_found());

        let mut raw = Array3::<u16>::zeros((5, 5, 3));
        raw[[1, 2, 2]] = 3;
        raw[[4, 0, 0]] = 1;
        ingest_raw(&store, &roi, &raw, &cfg).unwrap();

        let first = segment_apical_out(&store, &roi, &cfg).unwrap();
        assert_eq!(first.iter().filter(|v| **v).count(), 2);
        let key = roi.segmentation_key("mask");
        let stored: Array2<bool> = store.read(&key).unwrap();
        assert_eq!(stored, first);
        assert_eq!(store.attrs(&key).unwrap()["description"], "Apical-out mask");

        segment_apical_out(&store, &roi, &cfg).unwrap();
        let again: Array2<bool> = store.read(&key).unwrap();
        assert_eq!(again, first);

        let wrong = RoiId::parse("mix_1", "a_in_1").unwrap();
        assert!(segment_apical_out(&store, &wrong, &cfg).unwrap_err().is_invalid_argument());
    }
}
