//! 二维图像形态学与滤波原语.
//!
//! 所有函数都是纯函数: 输入视图不会被修改, 结果以新数组返回.
//! 打开 `rayon` feature 时, 逐像素的计算会按行并行执行, 结果与串行版本逐位一致.

mod disk;
mod filter;
mod region;

pub use disk::{dilate_disk, disk_half_widths, erode_disk};
pub use filter::{
    gaussian_filter, nonzero_soft, nonzero_union, rgb2gray, threshold_local, BorderMode,
};
pub use region::{clear_border, fill_holes, label_components, largest_component, Connectivity};

pub(crate) use region::components;

use ndarray::{Array2, Zip};

use crate::Idx2d;

/// 以 `f(索引)` 填充 `out` 的每一个元素.
pub(crate) fn fill_indexed<T, F>(out: &mut Array2<T>, f: F)
where
    T: Send,
    F: Fn(Idx2d) -> T + Sync + Send,
{
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            Zip::indexed(out).par_for_each(|pos, v| *v = f(pos));
        } else {
            Zip::indexed(out).for_each(|pos, v| *v = f(pos));
        }
    }
}
