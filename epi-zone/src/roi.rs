//! ROI 身份, 存储布局与原始数据写入.
//!
//! 每个 ROI 由三元组 `(mix, apical_type, roi_name)` 唯一确定. 其所有数据都位于
//! 存储中的 `{mix}/{apical_type}/{roi_name}` 子树下.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use ndarray::{Array2, Array3, Ix2, Ix3};
use serde_json::json;

use crate::consts::{self, channel, key};
use crate::store::{join_key, Store};
use crate::{Error, PipelineConfig, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 标本组. 每个组对应一对固定的生物标记物.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mix {
    /// `mix_1`: HER2 / SORLA.
    #[cfg_attr(feature = "serde", serde(rename = "mix_1"))]
    Mix1,

    /// `mix_2`: HER2 / HER3.
    #[cfg_attr(feature = "serde", serde(rename = "mix_2"))]
    Mix2,
}

impl Mix {
    /// 全部标本组.
    pub const ALL: [Mix; 2] = [Mix::Mix1, Mix::Mix2];

    /// 存储中的分组名.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mix::Mix1 => "mix_1",
            Mix::Mix2 => "mix_2",
        }
    }

    /// 通道 1, 通道 2 上的生物标记物名称, 仅用于标注输出字段.
    #[inline]
    pub const fn channel_names(&self) -> [&'static str; 2] {
        match self {
            Mix::Mix1 => ["HER2", "SORLA"],
            Mix::Mix2 => ["HER2", "HER3"],
        }
    }

    /// 形如 `HER2 / SORLA` 的标记物描述.
    pub fn targets(&self) -> String {
        let [a, b] = self.channel_names();
        format!("{a} / {b}")
    }
}

impl fmt::Display for Mix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Mix::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("未知 mix `{s}`")))
    }
}

/// 上皮形态类别. 两类 ROI 采用不同的分割策略.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ApicalType {
    /// 内翻型, 管腔位于组织内部.
    ApicalIn,

    /// 外翻型, 顶端面朝外.
    ApicalOut,
}

impl ApicalType {
    /// 存储中的分组名.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ApicalType::ApicalIn => key::APICAL_IN,
            ApicalType::ApicalOut => key::APICAL_OUT,
        }
    }

    /// ROI 名称中标识该类型的标记.
    #[inline]
    pub const fn token(&self) -> &'static str {
        match self {
            ApicalType::ApicalIn => "_in_",
            ApicalType::ApicalOut => "_out_",
        }
    }

    /// 从 ROI 名称推断类型.
    ///
    /// 名称必须恰好包含 `_in_` 与 `_out_` 之一, 否则返回 [`Error::InvalidArgument`].
    pub fn infer(roi_name: &str) -> Result<Self> {
        let is_in = roi_name.contains(ApicalType::ApicalIn.token());
        let is_out = roi_name.contains(ApicalType::ApicalOut.token());
        match (is_in, is_out) {
            (true, false) => Ok(ApicalType::ApicalIn),
            (false, true) => Ok(ApicalType::ApicalOut),
            (false, false) => Err(Error::InvalidArgument(format!(
                "无法从 ROI `{roi_name}` 推断 apical 类型"
            ))),
            (true, true) => Err(Error::InvalidArgument(format!(
                "ROI `{roi_name}` 同时含有 `_in_` 与 `_out_`"
            ))),
        }
    }
}

impl fmt::Display for ApicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApicalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            key::APICAL_IN => Ok(ApicalType::ApicalIn),
            key::APICAL_OUT => Ok(ApicalType::ApicalOut),
            other => Err(Error::InvalidArgument(format!("未知 apical 类型 `{other}`"))),
        }
    }
}

/// ROI 身份.
///
/// 构造时保证 `apical` 与名称中的标记一致.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiId {
    mix: Mix,
    apical: ApicalType,
    name: String,
}

impl fmt::Display for RoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.mix, self.apical, self.name)
    }
}

impl RoiId {
    /// 由标本组和 ROI 名称构造, apical 类型从名称推断.
    pub fn new(mix: Mix, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let apical = ApicalType::infer(&name)?;
        Self::with_apical(mix, apical, name)
    }

    /// 由三元组构造. 名称中的标记必须与 `apical` 一致, 否则返回
    /// [`Error::InvalidArgument`].
    pub fn with_apical(mix: Mix, apical: ApicalType, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(Error::InvalidArgument(format!("非法 ROI 名称 `{name}`")));
        }
        let inferred = ApicalType::infer(&name)?;
        if inferred != apical {
            return Err(Error::InvalidArgument(format!(
                "ROI `{name}` 不是 {apical} 类型 (缺少 `{}`)",
                apical.token()
            )));
        }
        Ok(Self { mix, apical, name })
    }

    /// 由字符串形式的 mix 与名称构造.
    pub fn parse(mix: &str, name: &str) -> Result<Self> {
        Self::new(mix.parse()?, name)
    }

    /// 标本组.
    #[inline]
    pub fn mix(&self) -> Mix {
        self.mix
    }

    /// apical 类型.
    #[inline]
    pub fn apical(&self) -> ApicalType {
        self.apical
    }

    /// ROI 名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 检查 ROI 是否为 `expected` 类型, 否则返回 [`Error::InvalidArgument`].
    pub fn expect_apical(&self, expected: ApicalType) -> Result<()> {
        if self.apical == expected {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "ROI `{}` 不是 {expected} 类型",
                self.name
            )))
        }
    }

    /// ROI 子树的根键.
    pub fn root_key(&self) -> String {
        join_key([self.mix.as_str(), self.apical.as_str(), self.name.as_str()])
    }

    /// 原始图像的键.
    pub fn raw_key(&self) -> String {
        join_key([self.root_key().as_str(), key::RAW_DATA])
    }

    /// 分割结果 `leaf` 的键, 即 `.../segmentation/{leaf}`.
    pub fn segmentation_key(&self, leaf: &str) -> String {
        join_key([self.root_key().as_str(), key::SEGMENTATION, leaf])
    }

    /// 区带结果 `leaf` 的键, 即 `.../segmentation/zones/{leaf}`.
    pub fn zone_key(&self, leaf: &str) -> String {
        join_key([self.root_key().as_str(), key::SEGMENTATION, key::ZONES, leaf])
    }

    /// 确认 ROI 存在于存储中, 否则返回 [`Error::NotFound`].
    pub fn ensure_exists(&self, store: &Store) -> Result<()> {
        let k = self.root_key();
        if store.exists(&k) {
            Ok(())
        } else {
            Err(Error::NotFound(k))
        }
    }

    /// 读取原始图像 `(高, 宽, 通道)`. 通道数必须为 3.
    pub fn read_raw(&self, store: &Store) -> Result<Array3<u16>> {
        self.ensure_exists(store)?;
        let raw: Array3<u16> = store.read::<u16, Ix3>(&self.raw_key())?;
        check_raw_shape(raw.shape())?;
        Ok(raw)
    }

    /// 读取分割结果中的布尔掩膜.
    pub fn read_segmentation_mask(&self, store: &Store, leaf: &str) -> Result<Array2<bool>> {
        store.read::<bool, Ix2>(&self.segmentation_key(leaf))
    }

    /// 读取区带掩膜.
    pub fn read_zone_mask(&self, store: &Store, leaf: &str) -> Result<Array2<bool>> {
        store.read::<bool, Ix2>(&self.zone_key(leaf))
    }
}

/// 检查原始图像形状必须为 `(高, 宽, 3)`.
pub(crate) fn check_raw_shape(shape: &[usize]) -> Result<()> {
    if shape.len() != 3 || shape[2] != channel::COUNT {
        return Err(Error::InvalidArgument(format!(
            "原始图像必须为 {} 通道, 实际形状 {shape:?}",
            channel::COUNT,
        )));
    }
    Ok(())
}

/// 遍历存储, 按 mix, apical 类型, ROI 名称的字典序列出所有 ROI.
///
/// 不认识的 mix / apical 分组以及名称与所在分组类型不符的 ROI 会导致
/// [`Error::InvalidArgument`].
pub fn list_rois(store: &Store) -> Result<Vec<RoiId>> {
    let mut ans = Vec::with_capacity(32);
    for mix_name in store.list_children("")? {
        let mix: Mix = mix_name.parse()?;
        for ap_name in store.list_children(&mix_name)? {
            let apical: ApicalType = ap_name.parse()?;
            for roi in store.list_children(&join_key([mix_name.as_str(), ap_name.as_str()]))? {
                ans.push(RoiId::with_apical(mix, apical, roi)?);
            }
        }
    }
    debug!("存储中共 {} 个 ROI", ans.len());
    Ok(ans)
}

/// 写入原始图像 `(高, 宽, 3)` 并附带溯源属性. 同时更新 mix 分组的属性.
///
/// 原始图像一经写入即不可变: 已存在时返回 [`Error::AlreadyExists`].
pub fn ingest_raw(
    store: &Store,
    roi: &RoiId,
    image: &Array3<u16>,
    cfg: &PipelineConfig,
) -> Result<()> {
    check_raw_shape(image.shape())?;
    let k = roi.raw_key();
    if store.is_array(&k) {
        return Err(Error::AlreadyExists(k));
    }
    let (h, w, _) = image.dim();
    let attrs = crate::attrs! {
        "name" => roi.name(),
        "author" => cfg.author.as_str(),
        "resolution" => json!({
            "unit": "microns / pixel",
            "x": cfg.pixel_size_um,
            "y": cfg.pixel_size_um,
        }),
        "bit_depth" => consts::BIT_DEPTH,
        "dim_order" => "YXC",
        "dimensions" => json!({
            "height": h,
            "width": w,
            "channels": channel::DYE_NAMES,
        }),
        "height" => h,
        "width" => w,
    };
    store.write(&k, image, &attrs)?;
    store.write_group_attrs(
        roi.mix().as_str(),
        &crate::attrs! {"name" => roi.mix().as_str(), "targets" => roi.mix().targets()},
    )?;
    info!("已写入原始图像 {roi} ({h}x{w})");
    Ok(())
}
