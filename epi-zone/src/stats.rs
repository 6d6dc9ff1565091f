//! 掩膜内的统计量: 计数, 求和, 均值与 Pearson 相关系数.
//!
//! 值与掩膜的形状必须一致, 否则返回 [`Error::ShapeMismatch`].

use itertools::izip;
use ndarray::ArrayView2;
use num::ToPrimitive;

use crate::{Error, Result};

/// 掩膜中前景像素的个数.
#[inline]
pub fn count_true(mask: ArrayView2<bool>) -> u64 {
    mask.iter().filter(|v| **v).count() as u64
}

/// 掩膜内像素值之和.
///
/// # 注意
///
/// 只用于非负整数像素. 负数或无法表示为 `u64` 的值按 0 计.
pub fn masked_sum<T>(values: ArrayView2<T>, mask: ArrayView2<bool>) -> Result<u64>
where
    T: ToPrimitive + Copy,
{
    Error::check_shape(values.shape(), mask.shape())?;
    Ok(izip!(values.iter(), mask.iter())
        .filter(|(_, m)| **m)
        .map(|(v, _)| v.to_u64().unwrap_or_default())
        .sum())
}

/// 由和与个数计算均值. 个数为 0 时没有定义, 返回 `None`.
#[inline]
pub fn mean_of(sum: u64, count: u64) -> Option<f64> {
    (count > 0).then(|| sum as f64 / count as f64)
}

/// 掩膜内两组像素值的 Pearson 相关系数.
///
/// # 返回值
///
/// 位于 `[-1, 1]`. 像素少于 2 个或任一组方差为 0 时相关系数没有定义, 返回 0.
pub fn pearson<T>(xs: ArrayView2<T>, ys: ArrayView2<T>, mask: ArrayView2<bool>) -> Result<f64>
where
    T: ToPrimitive + Copy,
{
    Error::check_shape(xs.shape(), mask.shape())?;
    Error::check_shape(ys.shape(), mask.shape())?;

    let pairs = || {
        izip!(xs.iter(), ys.iter(), mask.iter())
            .filter(|(_, _, m)| **m)
            .map(|(x, y, _)| {
                (
                    x.to_f64().unwrap_or_default(),
                    y.to_f64().unwrap_or_default(),
                )
            })
    };

    let (mut n, mut sx, mut sy) = (0usize, 0.0, 0.0);
    for (x, y) in pairs() {
        n += 1;
        sx += x;
        sy += y;
    }
    if n < 2 {
        return Ok(0.0);
    }
    let (mx, my) = (sx / n as f64, sy / n as f64);

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs() {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Ok(0.0);
    }
    Ok((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}
