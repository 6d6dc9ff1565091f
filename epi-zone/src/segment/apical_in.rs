//! apical-in ROI 的分割: 局部自适应阈值 + 最大内部空洞 (管腔) 检测.

use log::{debug, info, warn};
use ndarray::{Array2, ArrayView3, Zip};

use super::provenance;
use crate::consts::{key, U16_MAX_F64};
use crate::morph::{
    clear_border, fill_holes, gaussian_filter, largest_component, nonzero_soft, rgb2gray,
    threshold_local, BorderMode, Connectivity,
};
use crate::roi::check_raw_shape;
use crate::{ApicalType, PipelineConfig, Result, RoiId, Store};

/// apical-in 分割的全部产物.
#[derive(Clone, Debug, PartialEq)]
pub struct ApicalInSegmentation {
    /// 局部阈值二值化得到的初级掩膜.
    pub primitive: Array2<bool>,

    /// 最大内部空洞, 已填充. 没有内部空洞时全为背景.
    pub largest_hole: Array2<bool>,

    /// 最终组织掩膜, 不含最大空洞.
    pub mask: Array2<bool>,

    /// 最大空洞在填充前的面积 (像素).
    pub hole_area: usize,
}

/// 由原始图像计算 apical-in 分割结果.
///
/// 1. 外轮廓软掩膜: 各通道非零指示量的灰度化加权和.
/// 2. 灰度图经高斯平滑 (越界取最近像素) 后放缩到 16-bit 整数范围 (截断取整).
/// 3. 以邻域高斯均值作局部阈值, 严格大于阈值的像素为初级前景.
/// 4. 初级背景中清除贴边区域 (8-邻域), 剩余区域中面积最大者 (并列取行优先最先出现者)
///    经填洞后作为管腔.
/// 5. 组织掩膜为 `软掩膜 > 0` 与初级前景之并的填洞结果, 再去掉管腔.
///
/// 原始图像不是 3 通道或配置中的阈值邻域边长不合法时返回
/// [`crate::Error::InvalidArgument`].
pub fn compute_apical_in(raw: ArrayView3<u16>, cfg: &PipelineConfig) -> Result<ApicalInSegmentation> {
    check_raw_shape(raw.shape())?;
    let soft = nonzero_soft(raw);

    let gray = rgb2gray(raw);
    let smoothed = gaussian_filter(gray.view(), cfg.smoothing_sigma, BorderMode::Nearest);
    let scaled = smoothed.mapv(|v| f64::from((v * U16_MAX_F64) as u16));
    let threshold = threshold_local(scaled.view(), cfg.threshold_block_size)?;
    let primitive = Zip::from(&scaled)
        .and(&threshold)
        .map_collect(|v, t| v > t);

    let holes = clear_border(primitive.mapv(|v| !v).view(), Connectivity::Eight);
    let (hole, hole_area) = largest_component(holes.view(), Connectivity::Eight);
    let largest_hole = if hole_area > 0 {
        fill_holes(hole.view())
    } else {
        hole
    };

    let candidate = Zip::from(&soft)
        .and(&primitive)
        .map_collect(|s, p| *s > 0.0 || *p);
    let mut mask = fill_holes(candidate.view());
    Zip::from(&mut mask)
        .and(&largest_hole)
        .for_each(|m, h| *m &= !*h);

    Ok(ApicalInSegmentation {
        primitive,
        largest_hole,
        mask,
        hole_area,
    })
}

/// 分割 apical-in ROI, 并将初级掩膜, 最大空洞与最终掩膜分别写入
/// `segmentation/{primitive_mask, largest_hole, mask}`. 旧版本遗留的
/// `segmentation/inverted` 会被删除.
///
/// ROI 不存在时返回 [`crate::Error::NotFound`], ROI 名称不含 `_in_` 时返回
/// [`crate::Error::InvalidArgument`].
pub fn segment_apical_in(
    store: &Store,
    roi: &RoiId,
    cfg: &PipelineConfig,
) -> Result<ApicalInSegmentation> {
    roi.expect_apical(ApicalType::ApicalIn)?;
    let raw = roi.read_raw(store)?;
    let seg = compute_apical_in(raw.view(), cfg)?;
    if seg.hole_area == 0 {
        warn!("{roi}: 没有找到内部空洞, 管腔掩膜为空");
    } else {
        debug!("{roi}: 最大内部空洞面积 {} 像素", seg.hole_area);
    }

    if store.delete(&roi.segmentation_key(key::LEGACY_INVERTED))? {
        debug!("{roi}: 已清除遗留的初级掩膜");
    }

    let mut primitive_attrs = provenance(cfg, "Primitive mask");
    primitive_attrs.extend(crate::attrs! {
        "smoothing_sigma" => cfg.smoothing_sigma,
        "threshold_block_size" => cfg.threshold_block_size,
    });
    store.write(
        &roi.segmentation_key(key::PRIMITIVE_MASK),
        &seg.primitive,
        &primitive_attrs,
    )?;
    store.write(
        &roi.segmentation_key(key::LARGEST_HOLE),
        &seg.largest_hole,
        &provenance(
            cfg,
            "Mask of the largest inner hole, usually corresponding to the luminal space",
        ),
    )?;
    store.write(
        &roi.segmentation_key(key::MASK),
        &seg.mask,
        &provenance(cfg, "Final apical-in mask"),
    )?;
    info!("{roi}: apical-in 分割完成");
    Ok(seg)
}

#[cfg(test)]
mod tests {
    use super::{compute_apical_in, segment_apical_in};
    use crate::roi::ingest_raw;
    use crate::{OpenMode, PipelineConfig, RoiId, Store};
    use ndarray::{s, Array2, Array3};

    fn small_cfg() -> PipelineConfig {
        let mut cfg = PipelineConfig::default().with_zone_thickness(3, 3);
        cfg.smoothing_sigma = 1.0;
        cfg.threshold_block_size = 31;
        cfg
    }

    /// 在 `(n, n)` 图像中央放一个实心方块, 再在方块中央挖一个方洞.
    fn ring(n: usize, outer: (usize, usize), inner: (usize, usize)) -> Array3<u16> {
        let mut raw = Array3::<u16>::zeros((n, n, 3));
        raw.slice_mut(s![outer.0..outer.1, outer.0..outer.1, ..]).fill(u16::MAX);
        raw.slice_mut(s![inner.0..inner.1, inner.0..inner.1, ..]).fill(0);
        raw
    }

    #[test]
    fn test_ring_has_lumen() {
        let raw = ring(60, (10, 50), (24, 36));
        let seg = compute_apical_in(raw.view(), &small_cfg()).unwrap();
        assert!(seg.hole_area > 0);
        assert!(seg.largest_hole[[30, 30]]);
        assert!(!seg.mask[[30, 30]]);
        assert!(seg.mask[[15, 15]]);
        assert!(!seg.mask[[2, 2]]);
        // 管腔与组织互斥.
        assert!(seg
            .mask
            .iter()
            .zip(seg.largest_hole.iter())
            .all(|(m, h)| !(*m && *h)));
    }

    #[test]
    fn test_blank_image_has_no_hole() {
        let raw = Array3::<u16>::zeros((20, 20, 3));
        let seg = compute_apical_in(raw.view(), &small_cfg()).unwrap();
        assert_eq!(seg.hole_area, 0);
        assert_eq!(seg.largest_hole, Array2::from_elem((20, 20), false));
        assert_eq!(seg.mask, Array2::from_elem((20, 20), false));
    }

    #[test]
    fn test_wrong_channel_count() {
        let cfg = small_cfg();
        for shape in [(20, 20, 1), (20, 20, 2), (20, 20, 4)] {
            let raw = Array3::<u16>::ones(shape);
            let err = compute_apical_in(raw.view(), &cfg).unwrap_err();
            assert!(err.is_invalid_argument(), "{shape:?}");
        }
    }

    #[test]
    fn test_segment_writes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let cfg = small_cfg();
        let roi = RoiId::parse("mix_2", "r_in_1").unwrap();
        ingest_raw(&store, &roi, &ring(40, (6, 34), (16, 24)), &cfg).unwrap();

        let legacy = roi.segmentation_key("inverted");
        store
            .write(&legacy, &Array2::from_elem((2, 2), true), &crate::attrs! {})
            .unwrap();

        let first = segment_apical_in(&store, &roi, &cfg).unwrap();
        assert!(!store.exists(&legacy));
        for leaf in ["primitive_mask", "largest_hole", "mask"] {
            assert!(store.is_array(&roi.segmentation_key(leaf)), "{leaf}");
        }
        let mask_key = roi.segmentation_key("mask");
        let stored: Array2<bool> = store.read(&mask_key).unwrap();
        assert_eq!(stored, first.mask);
        assert_eq!(store.attrs(&mask_key).unwrap()["author"], "Turku BioImaging");

        let second = segment_apical_in(&store, &roi, &cfg).unwrap();
        assert_eq!(first, second);

        let wrong = RoiId::parse("mix_2", "r_out_1").unwrap();
        assert!(segment_apical_in(&store, &wrong, &cfg).unwrap_err().is_invalid_argument());
        let missing = RoiId::parse("mix_2", "q_in_1").unwrap();
        assert!(segment_apical_in(&store, &missing, &cfg).unwrap_err().is_not_found());
    }
}
