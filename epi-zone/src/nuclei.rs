//! 细胞核实例分割的后处理与计数.
//!
//! 实例分割本身 (通常是深度学习模型) 通过 [`NucleiOracle`] 接入, 本模块只负责:
//! 用组织掩膜屏蔽核染色通道, 调用模型, 剔除越过组织边界或过小的实例, 并把标签写入
//! `segmentation/nuclei`.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis, Zip};

use crate::consts::{channel, key};
use crate::morph::{components, Connectivity};
use crate::{Error, PipelineConfig, Result, RoiId, Store};

/// 细胞核实例分割模型.
///
/// 输入为已用组织掩膜屏蔽的单通道核染色图像和组织掩膜本身, 输出与输入同形状的标签图:
/// 0 为背景, 每个正整数代表一个细胞核实例.
pub trait NucleiOracle {
    /// 预测细胞核实例标签.
    fn predict(&self, dapi: ArrayView2<u16>, mask: ArrayView2<bool>) -> Result<Array2<u32>>;
}

/// 以强度阈值加 4-邻域连通区域作为细胞核实例的朴素模型.
///
/// 没有可用的深度学习模型时可用于粗略估计, 也便于测试.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IntensityOracle {
    /// 严格大于该值的像素视为细胞核.
    pub threshold: u16,
}

impl NucleiOracle for IntensityOracle {
    fn predict(&self, dapi: ArrayView2<u16>, _mask: ArrayView2<bool>) -> Result<Array2<u32>> {
        let fg = dapi.mapv(|v| v > self.threshold);
        let mut labels = Array2::<u32>::zeros(dapi.dim());
        for (k, area) in components(fg.view(), Connectivity::Four).into_iter().enumerate() {
            for pos in area {
                labels[pos] = k as u32 + 1;
            }
        }
        Ok(labels)
    }
}

/// 剔除与背景 (`mask` 之外) 重叠或面积小于 `min_area` 的实例, 即把它们的标签置 0.
///
/// 返回被剔除的实例个数.
pub fn suppress_instances(labels: &mut Array2<u32>, mask: ArrayView2<bool>, min_area: usize) -> Result<usize> {
    Error::check_shape(labels.shape(), mask.shape())?;

    // 标签 -> (面积, 是否与背景重叠)
    let mut seen: HashMap<u32, (usize, bool)> = HashMap::new();
    Zip::from(&*labels).and(&mask).for_each(|&l, &m| {
        if l != 0 {
            let e = seen.entry(l).or_default();
            e.0 += 1;
            e.1 |= !m;
        }
    });
    let dropped: HashSet<u32> = seen
        .into_iter()
        .filter_map(|(l, (area, on_bg))| (on_bg || area < min_area).then_some(l))
        .collect();
    if !dropped.is_empty() {
        labels.mapv_inplace(|l| if dropped.contains(&l) { 0 } else { l });
    }
    Ok(dropped.len())
}

/// 区带内不同非零标签的个数, 即与区带重叠的细胞核个数.
pub fn count_in_zone(labels: ArrayView2<u32>, zone: ArrayView2<bool>) -> Result<u64> {
    Error::check_shape(labels.shape(), zone.shape())?;
    let ids: HashSet<u32> = labels
        .iter()
        .zip(zone.iter())
        .filter_map(|(&l, &z)| (z && l != 0).then_some(l))
        .collect();
    Ok(ids.len() as u64)
}

/// 读取 ROI 的细胞核标签.
pub fn read_nuclei(store: &Store, roi: &RoiId) -> Result<Array2<u32>> {
    store.read(&roi.segmentation_key(key::NUCLEI))
}

/// 对 ROI 做细胞核实例分割并写入 `segmentation/nuclei`. 需要先完成组织分割.
///
/// ROI 或组织掩膜不存在时返回 [`Error::NotFound`]; 模型输出形状不对时返回
/// [`Error::ShapeMismatch`].
pub fn segment_nuclei<O>(store: &Store, roi: &RoiId, oracle: &O, cfg: &PipelineConfig) -> Result<Array2<u32>>
where
    O: NucleiOracle + ?Sized,
{
    let raw = roi.read_raw(store)?;
    let mask = roi.read_segmentation_mask(store, key::MASK)?;
    let mut dapi = raw.index_axis(Axis(2), channel::NUCLEAR).to_owned();
    Error::check_shape(dapi.shape(), mask.shape())?;
    Zip::from(&mut dapi).and(&mask).for_each(|v, &m| {
        if !m {
            *v = 0;
        }
    });

    let mut labels = oracle.predict(dapi.view(), mask.view())?;
    Error::check_shape(dapi.shape(), labels.shape())?;
    let dropped = suppress_instances(&mut labels, mask.view(), cfg.nuclei_min_area)?;
    debug!("{roi}: 剔除 {dropped} 个越界或过小的细胞核");

    store.write(
        &roi.segmentation_key(key::NUCLEI),
        &labels,
        &crate::attrs! {
            "author" => cfg.author.as_str(),
            "description" => "Nuclei segmentation labels",
            "min_area" => cfg.nuclei_min_area,
        },
    )?;
    info!("{roi}: 细胞核分割完成");
    Ok(labels)
}
