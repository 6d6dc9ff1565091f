#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对上皮组织荧光显微图像 ROI 进行组织分割、顶端 (apical) /
//! 基底 (basal) 区带划分, 并统计各区带内的荧光通道强度.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 原始图像约定为 `(高, 宽, 通道)` 排列的 16-bit 数据, 通道 0 为核染色
//!   (DAPI), 通道 1, 2 为两种生物标记物.
//! 2. 所有派生结果 (掩膜, 区带, 核标签) 都通过 [`store::Store`] 持久化,
//!   并以 ROI 身份作为键前缀. 每个阶段都可以独立重跑, 重跑结果逐位一致.
//! 3. 各 ROI 之间互不依赖, 可以放心地在多线程中并行处理.
//!
//! # 处理流程
//!
//! ### 组织分割 ✅
//!
//! apical-out ROI 直接以 "任意通道非零" 为前景; apical-in ROI
//! 通过高斯平滑 + 局部自适应阈值 + 最大内部空洞检测获得管腔和组织掩膜.
//!
//! 实现位于 `epi-zone/src/segment`.
//!
//! ### 区带生成 ✅
//!
//! 以圆盘结构元腐蚀组织掩膜得到紧贴外边界的外区带, 以圆盘结构元膨胀管腔得到
//! 紧贴管腔的内区带. 二者重叠的像素从两侧同时剔除.
//!
//! 实现位于 `epi-zone/src/zone`.
//!
//! ### ROI 统计 ✅
//!
//! 像素数, 物理面积, 各通道强度和与均值.
//!
//! 实现位于 `epi-zone/src/analysis.rs`.
//!
//! ### 通道相关性 ✅
//!
//! 按 whole_roi / apical / basal 区带计算强度总和, 面积归一化强度,
//! 细胞核数归一化强度以及两个标记物通道之间的 Pearson 相关系数.
//!
//! 实现位于 `epi-zone/src/correlation`.
//!
//! ### 批处理 ✅
//!
//! 以 ROI 为单位的并行扇出, 单个 ROI 失败不影响其他 ROI.
//!
//! 实现位于 `epi-zone/src/batch.rs`.

/// 二维索引 `(高, 宽)`.
pub type Idx2d = (usize, usize);

/// 按行优先顺序排列的像素索引集合, 代表一个连通区域.
type Area2d = Vec<Idx2d>;

pub mod analysis;
pub mod batch;
pub mod config;
pub mod consts;
pub mod correlation;
mod error;
pub mod morph;
pub mod nuclei;
pub mod prelude;
pub mod roi;
pub mod segment;
pub mod stats;
pub mod store;
pub mod zone;

pub use config::{OverlayStyle, PipelineConfig};
pub use error::{Error, Result};
pub use roi::{ApicalType, Mix, RoiId};
pub use store::{OpenMode, Store};
