//! 区带生成.
//!
//! - 外区带 (两类 ROI 都有): 组织掩膜 (apical-in 先并上管腔) 以圆盘腐蚀, 取反后与
//!   组织掩膜求交, 得到紧贴组织外边界的一圈.
//! - 内区带 (仅 apical-in): 管腔以圆盘膨胀后与组织掩膜求交, 得到紧贴管腔的一圈.
//!
//! 两个区带重叠的像素同时从两侧剔除, 因此最终二者互斥, 且都是组织掩膜的子集.

mod manual;
pub mod overlay;

pub use manual::{load_manual_inner_zone, manual_mask_path};
pub use overlay::{render_overlay, save_overlay};

use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView2, Zip};

use crate::consts::key;
use crate::morph::{dilate_disk, erode_disk};
use crate::store::Attrs;
use crate::{ApicalType, Error, PipelineConfig, Result, RoiId, Store};

/// 外区带.
///
/// `hole` 给出时, 先将其并入组织掩膜再腐蚀, 使管腔边缘不被当作组织外边界.
pub fn outer_zone(
    mask: ArrayView2<bool>,
    hole: Option<ArrayView2<bool>>,
    thickness: usize,
) -> Array2<bool> {
    let eroded = match hole {
        Some(hole) => {
            let closed = Zip::from(&mask).and(&hole).map_collect(|m, h| *m || *h);
            erode_disk(closed.view(), thickness)
        }
        None => erode_disk(mask, thickness),
    };
    Zip::from(&eroded).and(&mask).map_collect(|e, m| !*e && *m)
}

/// 内区带: 管腔膨胀后与组织掩膜求交.
pub fn inner_zone(mask: ArrayView2<bool>, hole: ArrayView2<bool>, thickness: usize) -> Array2<bool> {
    let dilated = dilate_disk(hole, thickness);
    Zip::from(&dilated).and(&mask).map_collect(|d, m| *d && *m)
}

/// 将两个区带的重叠像素从两侧同时剔除. 返回被剔除的像素个数.
pub fn resolve_overlap(outer: &mut Array2<bool>, inner: &mut Array2<bool>) -> usize {
    let mut cleared = 0;
    Zip::from(outer).and(inner).for_each(|o, i| {
        if *o && *i {
            *o = false;
            *i = false;
            cleared += 1;
        }
    });
    cleared
}

/// 由组织掩膜和管腔计算 apical-in 的外区带与内区带 (已去除重叠).
///
/// # 返回值
///
/// `(外区带, 内区带)`. 两个掩膜形状不一致时返回 [`Error::ShapeMismatch`].
pub fn compute_apical_in_zones(
    mask: ArrayView2<bool>,
    hole: ArrayView2<bool>,
    cfg: &PipelineConfig,
) -> Result<(Array2<bool>, Array2<bool>)> {
    Error::check_shape(mask.shape(), hole.shape())?;
    let mut outer = outer_zone(mask, Some(hole), cfg.outer_zone_thickness);
    let mut inner = inner_zone(mask, hole, cfg.inner_zone_thickness);
    let cleared = resolve_overlap(&mut outer, &mut inner);
    if cleared > 0 {
        debug!("内外区带重叠 {cleared} 个像素, 已从两侧剔除");
    }
    Ok((outer, inner))
}

/// apical-in 区带生成的全部产物.
#[derive(Clone, Debug, PartialEq)]
pub struct ApicalInZones {
    /// 外区带 (基底侧).
    pub outer: Array2<bool>,

    /// 内区带 (顶端侧).
    pub inner: Array2<bool>,

    /// 人工标注的内区带. 没有人工掩膜时为 `None`.
    pub inner_manual: Option<Array2<bool>>,

    /// 叠加可视化图像 `(高, 宽, 3)`. 未启用时为 `None`.
    pub overlay: Option<Array3<u8>>,
}

/// 区带结果的溯源属性.
fn zone_attrs(cfg: &PipelineConfig, roi: &RoiId, description: &str, thickness: Option<usize>) -> Attrs {
    let mut attrs = crate::attrs! {
        "author" => cfg.author.as_str(),
        "description" => description,
        "mix" => roi.mix().as_str(),
        "roi" => roi.name(),
    };
    if let Some(t) = thickness {
        attrs.insert("zone_thickness".to_string(), t.into());
    }
    attrs
}

/// 为 apical-out ROI 生成外区带并写入 `segmentation/zones/outer`.
///
/// ROI 或其组织掩膜不存在时返回 [`Error::NotFound`], ROI 不是 apical-out 类型时返回
/// [`Error::InvalidArgument`].
pub fn generate_apical_out_zones(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<Array2<bool>> {
    roi.expect_apical(ApicalType::ApicalOut)?;
    roi.ensure_exists(store)?;
    let mask = roi.read_segmentation_mask(store, key::MASK)?;

    let outer = outer_zone(mask.view(), None, cfg.outer_zone_thickness);
    store.write(
        &roi.zone_key(key::OUTER),
        &outer,
        &zone_attrs(cfg, roi, "Apical-out outer zone", Some(cfg.outer_zone_thickness)),
    )?;
    info!("{roi}: apical-out 区带生成完成");
    Ok(outer)
}

/// 为 apical-in ROI 生成外区带, 内区带, 人工内区带 (如有) 与叠加图 (如启用),
/// 分别写入 `segmentation/zones/{outer, inner, inner_manual, overlay}`.
///
/// 旧的人工内区带总会先被删除, 只有当前仍能找到人工掩膜时才重新写入.
///
/// ROI, 组织掩膜或管腔不存在时返回 [`Error::NotFound`]; ROI 不是 apical-in 类型时返回
/// [`Error::InvalidArgument`]; 人工掩膜尺寸与组织掩膜不一致时返回
/// [`Error::ShapeMismatch`]. 出错时不会写入任何内容.
pub fn generate_apical_in_zones(store: &Store, roi: &RoiId, cfg: &PipelineConfig) -> Result<ApicalInZones> {
    roi.expect_apical(ApicalType::ApicalIn)?;
    roi.ensure_exists(store)?;
    let mask = roi.read_segmentation_mask(store, key::MASK)?;
    let hole = roi.read_segmentation_mask(store, key::LARGEST_HOLE)?;

    // 所有输入都检查完毕后才开始写入, 失败时存储中的区带与叠加图保持一致.
    let (outer, inner) = compute_apical_in_zones(mask.view(), hole.view(), cfg)?;
    let inner_manual = load_manual_inner_zone(cfg.manual_roi_dir.as_deref(), roi.name())?;
    if let Some(manual) = inner_manual.as_ref() {
        Error::check_shape(mask.shape(), manual.shape())?;
    }
    let overlay = if cfg.overlay.enabled {
        let raw = roi.read_raw(store)?;
        Some(render_overlay(raw.view(), outer.view(), inner.view(), &cfg.overlay)?)
    } else {
        None
    };

    store.write(
        &roi.zone_key(key::OUTER),
        &outer,
        &zone_attrs(cfg, roi, "Apical-in outer zone", Some(cfg.outer_zone_thickness)),
    )?;
    store.write(
        &roi.zone_key(key::INNER),
        &inner,
        &zone_attrs(cfg, roi, "Apical-in inner zone", Some(cfg.inner_zone_thickness)),
    )?;

    let manual_key = roi.zone_key(key::INNER_MANUAL);
    store.delete(&manual_key)?;
    if let Some(manual) = inner_manual.as_ref() {
        store.write(
            &manual_key,
            manual,
            &zone_attrs(cfg, roi, "Apical-in inner zone manual mask", None),
        )?;
        info!("{roi}: 已写入人工内区带");
    }

    if let Some(img) = overlay.as_ref() {
        store.write(
            &roi.zone_key(key::OVERLAY),
            img,
            &zone_attrs(cfg, roi, "Apical-in zone overlays", None),
        )?;
    }

    info!("{roi}: apical-in 区带生成完成");
    Ok(ApicalInZones {
        outer,
        inner,
        inner_manual,
        overlay,
    })
}
