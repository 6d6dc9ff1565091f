//! 流水线配置.
//!
//! 所有可调参数集中在 [`PipelineConfig`] 中, 并显式地传给每一个阶段.
//! 这样批处理可以在不修改源码的情况下使用不同的参数.

use std::path::{Path, PathBuf};

use crate::consts;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 区带叠加可视化的绘制参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OverlayStyle {
    /// 是否生成叠加图.
    pub enabled: bool,

    /// 伽马校正系数.
    pub gamma: f64,

    /// 区带颜色的混合比例, 位于 `[0, 1]`.
    pub alpha: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            gamma: 0.5,
            alpha: 0.25,
        }
    }
}

/// 不可变的流水线配置.
///
/// 默认值与 [`crate::consts`] 中的常量一致.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// 物理像素尺寸 (微米每像素). 所有面积与归一化计算共用该值.
    pub pixel_size_um: f64,

    /// 外区带厚度, 即腐蚀所用圆盘的半径 (像素).
    pub outer_zone_thickness: usize,

    /// 内区带厚度, 即膨胀所用圆盘的半径 (像素).
    pub inner_zone_thickness: usize,

    /// apical-in 分割中高斯平滑的标准差 (像素).
    pub smoothing_sigma: f64,

    /// 局部自适应阈值的邻域边长 (像素). 必须是奇数.
    pub threshold_block_size: usize,

    /// 叠加图绘制参数.
    pub overlay: OverlayStyle,

    /// 细胞核实例最小面积 (像素).
    pub nuclei_min_area: usize,

    /// 人工内区带掩膜所在目录. 为 `None` 时不查找人工掩膜.
    pub manual_roi_dir: Option<PathBuf>,

    /// 写入派生结果 `author` 属性的值.
    pub author: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pixel_size_um: consts::PIXEL_SIZE_UM,
            outer_zone_thickness: consts::OUTER_ZONE_THICKNESS,
            inner_zone_thickness: consts::INNER_ZONE_THICKNESS,
            smoothing_sigma: consts::SMOOTHING_SIGMA,
            threshold_block_size: consts::THRESHOLD_BLOCK_SIZE,
            overlay: OverlayStyle::default(),
            nuclei_min_area: consts::NUCLEI_MIN_AREA,
            manual_roi_dir: None,
            author: consts::AUTHOR.to_string(),
        }
    }
}

impl PipelineConfig {
    /// 检查配置是否合法. 不合法时返回 [`Error::InvalidArgument`].
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidArgument(msg));

        if !(self.pixel_size_um.is_finite() && self.pixel_size_um > 0.0) {
            return fail(format!("像素尺寸必须为正数, 实际为 {}", self.pixel_size_um));
        }
        if !(self.smoothing_sigma.is_finite() && self.smoothing_sigma >= 0.0) {
            return fail(format!("平滑标准差不能为负, 实际为 {}", self.smoothing_sigma));
        }
        if self.threshold_block_size % 2 == 0 {
            return fail(format!(
                "阈值邻域边长必须为奇数, 实际为 {}",
                self.threshold_block_size
            ));
        }
        if !(self.overlay.gamma.is_finite() && self.overlay.gamma > 0.0) {
            return fail(format!("伽马系数必须为正数, 实际为 {}", self.overlay.gamma));
        }
        if !(0.0..=1.0).contains(&self.overlay.alpha) {
            return fail(format!("混合比例必须位于 [0, 1], 实际为 {}", self.overlay.alpha));
        }
        Ok(())
    }

    /// 以 `dir` 作为人工内区带掩膜目录, 返回新的配置.
    pub fn with_manual_roi_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.manual_roi_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// 同时设置内外区带厚度, 返回新的配置.
    pub fn with_zone_thickness(mut self, outer: usize, inner: usize) -> Self {
        self.outer_zone_thickness = outer;
        self.inner_zone_thickness = inner;
        self
    }

    /// 局部阈值所用高斯核的标准差. 与邻域边长的换算关系为 `(block - 1) / 6`.
    #[inline]
    pub fn threshold_sigma(&self) -> f64 {
        (self.threshold_block_size as f64 - 1.0) / 6.0
    }

    /// 将像素个数换算为物理面积.
    #[inline]
    pub fn area_of(&self, pixels: u64) -> f64 {
        pixels as f64 * self.pixel_size_um
    }

    /// 从 JSON 文件加载配置. 未出现的字段取默认值. 加载后会调用
    /// [`Self::validate`].
    #[cfg(feature = "serde")]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let cfg: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// 默认存储目录名, 位于 `{用户主目录}/dataset` 下.
pub const DEFAULT_STORE_NAME: &str = "roi_data";

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 获取默认存储目录 `{用户主目录}/dataset/roi_data`.
#[inline]
pub fn default_store_dir() -> Option<PathBuf> {
    home_dataset_dir_with([DEFAULT_STORE_NAME])
}
