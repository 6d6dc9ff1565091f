//! 运行时错误.

use std::io;

use ndarray_npy::{ReadNpzError, WriteNpzError};

/// 本 crate 所有可失败操作的返回值.
pub type Result<T> = std::result::Result<T, Error>;

/// 存储访问与流水线各阶段的运行时错误.
///
/// 退化输入 (空区带, 无细胞核, 无内部空洞) 不属于错误, 由各阶段的回退值处理.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 存储中不存在给定的键 (ROI, 掩膜或数组).
    #[error("键 `{0}` 不存在")]
    NotFound(String),

    /// 参数不合法: ROI 名称缺少或同时含有两种 apical 标记, 未知 mix,
    /// 非法键名或非法配置等.
    #[error("参数不合法: {0}")]
    InvalidArgument(String),

    /// 试图覆盖不可变的数据 (例如原始图像).
    #[error("键 `{0}` 已存在且不可覆盖")]
    AlreadyExists(String),

    /// 以只读模式打开的存储不允许写入.
    #[error("存储以只读模式打开")]
    ReadOnly,

    /// 参与运算的两个数组形状不一致.
    #[error("形状不一致: 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        /// 期望的形状.
        expected: Vec<usize>,
        /// 实际的形状.
        actual: Vec<usize>,
    },

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// 读取 npz 归档错误.
    #[error(transparent)]
    ReadNpz(#[from] ReadNpzError),

    /// 写入 npz 归档错误.
    #[error(transparent)]
    WriteNpz(#[from] WriteNpzError),

    /// 属性 (JSON) 编解码错误.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// 图像编解码错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    /// 是否是 [`Error::NotFound`].
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// 是否是 [`Error::InvalidArgument`].
    #[inline]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// 检查两个形状是否一致, 不一致时返回 [`Error::ShapeMismatch`].
    pub(crate) fn check_shape(expected: &[usize], actual: &[usize]) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::ShapeMismatch {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            })
        }
    }
}
