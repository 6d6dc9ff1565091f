//! 通用常量.

/// 原始图像通道.
pub mod channel {
    /// 核染色 (DAPI) 通道索引.
    pub const NUCLEAR: usize = 0;

    /// 第一种生物标记物 (Cy3) 通道索引.
    pub const MARKER_1: usize = 1;

    /// 第二种生物标记物 (AF647) 通道索引.
    pub const MARKER_2: usize = 2;

    /// 原始图像通道总数.
    pub const COUNT: usize = 3;

    /// 按通道索引排列的荧光染料名称.
    pub const DYE_NAMES: [&str; COUNT] = ["DAPI", "Cy3", "AF647"];

    /// 两个标记物通道的索引, 按输出顺序排列.
    pub const MARKERS: [usize; 2] = [MARKER_1, MARKER_2];

    /// 灰度化权重 (与 ITU-R BT.709 一致), 依次对应通道 0, 1, 2.
    pub const GRAY_WEIGHTS: [f64; COUNT] = [0.2125, 0.7154, 0.0721];
}

/// 存储层中各类节点的名字.
pub mod key {
    /// apical-in 类型分组名.
    pub const APICAL_IN: &str = "apical_in";

    /// apical-out 类型分组名.
    pub const APICAL_OUT: &str = "apical_out";

    /// 原始图像.
    pub const RAW_DATA: &str = "raw_data";

    /// 分割结果分组.
    pub const SEGMENTATION: &str = "segmentation";

    /// 最终组织掩膜.
    pub const MASK: &str = "mask";

    /// 局部阈值二值化后的初级掩膜.
    pub const PRIMITIVE_MASK: &str = "primitive_mask";

    /// 初级掩膜的历史名称. 重新分割时会被清除.
    pub const LEGACY_INVERTED: &str = "inverted";

    /// 最大内部空洞 (管腔).
    pub const LARGEST_HOLE: &str = "largest_hole";

    /// 细胞核实例标签.
    pub const NUCLEI: &str = "nuclei";

    /// 区带分组.
    pub const ZONES: &str = "zones";

    /// 外区带.
    pub const OUTER: &str = "outer";

    /// 内区带.
    pub const INNER: &str = "inner";

    /// 人工标注的内区带.
    pub const INNER_MANUAL: &str = "inner_manual";

    /// 区带叠加可视化图像.
    pub const OVERLAY: &str = "overlay";
}

/// 物理像素尺寸, 单位为微米每像素.
pub const PIXEL_SIZE_UM: f64 = 0.325;

/// 外区带默认厚度 (像素).
pub const OUTER_ZONE_THICKNESS: usize = 45;

/// 内区带默认厚度 (像素).
pub const INNER_ZONE_THICKNESS: usize = 45;

/// apical-in 分割时高斯平滑的默认标准差 (像素).
pub const SMOOTHING_SIGMA: f64 = 3.0;

/// 局部自适应阈值的默认邻域边长 (像素, 奇数).
pub const THRESHOLD_BLOCK_SIZE: usize = 355;

/// 细胞核实例的默认最小面积 (像素). 小于该值的实例会被剔除.
pub const NUCLEI_MIN_AREA: usize = 150;

/// 派生结果的默认作者.
pub const AUTHOR: &str = "Turku BioImaging";

/// 原始数据的位深.
pub const BIT_DEPTH: u32 = 16;

/// 16-bit 强度上限, 以浮点数表示.
pub const U16_MAX_F64: f64 = u16::MAX as f64;
