//! 灰度化, 高斯滤波与局部自适应阈值.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, Axis, Zip};

use crate::consts::{channel, U16_MAX_F64};
use crate::{Error, Result};

/// 高斯截断半径 (以标准差为单位).
const TRUNCATE: f64 = 4.0;

/// 滤波时越界位置的取值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BorderMode {
    /// 取最近的边界像素, `aaa|abcd|ddd`.
    Nearest,

    /// 以边界为轴镜像 (边界像素重复一次), `cba|abcd|dcb`.
    Reflect,
}

impl BorderMode {
    /// 将可能越界的索引 `i` 映射到 `[0, n)` 中.
    #[inline]
    fn map(&self, i: isize, n: usize) -> usize {
        let n = n as isize;
        match self {
            BorderMode::Nearest => i.clamp(0, n - 1) as usize,
            BorderMode::Reflect => {
                let period = 2 * n;
                let m = i.rem_euclid(period);
                (if m >= n { period - 1 - m } else { m }) as usize
            }
        }
    }
}

/// 以 16-bit 原始图像 `(高, 宽, 3)` 计算 `[0, 1]` 范围内的灰度图.
///
/// # Panics
///
/// 通道数少于 3 时 panic. 调用方应先检查形状.
pub fn rgb2gray(raw: ArrayView3<u16>) -> Array2<f64> {
    let (h, w, _) = raw.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        channel::GRAY_WEIGHTS
            .iter()
            .enumerate()
            .map(|(c, k)| f64::from(raw[[i, j, c]]) / U16_MAX_F64 * k)
            .sum()
    })
}

/// "任意通道非零" 的软掩膜: 对各通道的非零指示量做灰度化加权求和.
///
/// 像素值大于零当且仅当它至少有一个通道非零.
///
/// # Panics
///
/// 通道数少于 3 时 panic.
pub fn nonzero_soft(raw: ArrayView3<u16>) -> Array2<f64> {
    let (h, w, _) = raw.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        channel::GRAY_WEIGHTS
            .iter()
            .enumerate()
            .filter(|(c, _)| raw[[i, j, *c]] != 0)
            .map(|(_, k)| k)
            .sum()
    })
}

/// "任意通道非零" 的二值掩膜.
pub fn nonzero_union(raw: ArrayView3<u16>) -> Array2<bool> {
    raw.map_axis(Axis(2), |px| px.iter().any(|v| *v != 0))
}

/// 截断半径为 `(TRUNCATE * sigma + 0.5)` 取整的归一化一维高斯核.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let s2 = sigma * sigma;
    let raw: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / s2).exp())
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// 沿一条线做相关运算, 越界位置按 `mode` 取值.
fn correlate_lane(
    src: ArrayView1<f64>,
    mut dst: ArrayViewMut1<f64>,
    kernel: &[f64],
    mode: BorderMode,
    padded: &mut Vec<f64>,
) {
    let n = src.len();
    let r = kernel.len() / 2;
    padded.clear();
    padded.extend((0..n + 2 * r).map(|k| src[mode.map(k as isize - r as isize, n)]));
    for (i, out) in dst.iter_mut().enumerate() {
        *out = padded[i..i + kernel.len()]
            .iter()
            .zip(kernel)
            .map(|(a, b)| a * b)
            .sum();
    }
}

/// 沿 `axis` 对每一条线做一维滤波.
fn filter_axis(src: ArrayView2<f64>, axis: Axis, kernel: &[f64], mode: BorderMode) -> Array2<f64> {
    let mut ans = Array2::<f64>::zeros(src.dim());
    let zip = Zip::from(ans.lanes_mut(axis)).and(src.lanes(axis));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|dst, lane| {
                correlate_lane(lane, dst, kernel, mode, &mut Vec::new());
            });
        } else {
            let mut padded = Vec::new();
            zip.for_each(|dst, lane| correlate_lane(lane, dst, kernel, mode, &mut padded));
        }
    }
    ans
}

/// 标准差为 `sigma` 的二维高斯滤波. 依次沿行方向 (轴 0) 与列方向 (轴 1)
/// 做可分离的一维滤波.
///
/// `sigma` 为 0 时原样返回.
pub fn gaussian_filter(img: ArrayView2<f64>, sigma: f64, mode: BorderMode) -> Array2<f64> {
    if sigma <= 0.0 || img.is_empty() {
        return img.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let tmp = filter_axis(img, Axis(0), &kernel, mode);
    filter_axis(tmp.view(), Axis(1), &kernel, mode)
}

/// 以高斯加权邻域均值作为每个像素的局部阈值.
///
/// 邻域边长 `block_size` 必须为大于 1 的奇数, 对应的高斯标准差为
/// `(block_size - 1) / 6`, 越界位置按 [`BorderMode::Reflect`] 取值.
pub fn threshold_local(img: ArrayView2<f64>, block_size: usize) -> Result<Array2<f64>> {
    if block_size % 2 == 0 || block_size < 3 {
        return Err(Error::InvalidArgument(format!(
            "局部阈值邻域边长必须为大于 1 的奇数, 实际为 {block_size}"
        )));
    }
    let sigma = (block_size as f64 - 1.0) / 6.0;
    Ok(gaussian_filter(img, sigma, BorderMode::Reflect))
}
