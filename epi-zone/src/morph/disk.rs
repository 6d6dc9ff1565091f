//! 以圆盘为结构元的二值腐蚀与膨胀.
//!
//! 半径为 `r` 的圆盘包含所有满足 `dx² + dy² <= r²` 的偏移. 圆盘按行拆成若干水平弦,
//! 借助每行的前缀计数, 每个像素只需 `O(r)` 次查询.
//!
//! # 注意
//!
//! 只有图像内的像素参与运算. 对于圆盘这样关于原点对称的凸结构元, 这与以镜像方式
//! 延拓边界的结果一致: 镜像得到的像素总是比被镜像的越界位置离中心更近,
//! 因此已经落在圆盘之内.

use ndarray::{Array2, ArrayView2, Axis};

use super::fill_indexed;
use crate::Idx2d;

/// 圆盘每一行弦的半宽. 第 `k` 个元素对应纵向偏移 `k - r`.
pub fn disk_half_widths(radius: usize) -> Vec<usize> {
    let r2 = radius * radius;
    (0..=2 * radius)
        .map(|k| {
            let dy = k.abs_diff(radius);
            isqrt(r2 - dy * dy)
        })
        .collect()
}

/// 不超过 `sqrt(n)` 的最大整数.
fn isqrt(n: usize) -> usize {
    let mut x = (n as f64).sqrt() as usize;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}

/// 每行的前缀计数, 形状为 `(高, 宽 + 1)`. `ans[[i, j]]` 表示第 `i` 行前 `j`
/// 个像素中等于 `value` 的个数.
fn row_prefix(mask: ArrayView2<bool>, value: bool) -> Array2<u32> {
    let (h, w) = mask.dim();
    let mut ans = Array2::<u32>::zeros((h, w + 1));
    for (row, mut out) in mask.axis_iter(Axis(0)).zip(ans.axis_iter_mut(Axis(0))) {
        let mut acc = 0;
        for (j, &v) in row.iter().enumerate() {
            acc += u32::from(v == value);
            out[j + 1] = acc;
        }
    }
    ans
}

/// 以 `(h, w)` 为圆心的圆盘内 (限于图像内) 是否存在前缀计数所统计的像素.
fn disk_hits(prefix: &Array2<u32>, widths: &[usize], (h, w): Idx2d) -> bool {
    let (height, wp1) = prefix.dim();
    let width = wp1 - 1;
    let r = widths.len() / 2;
    let top = h.saturating_sub(r);
    let bottom = (h + r).min(height - 1);
    (top..=bottom).any(|i| {
        let half = widths[i + r - h];
        let lo = w.saturating_sub(half);
        let hi = (w + half).min(width - 1);
        prefix[[i, hi + 1]] > prefix[[i, lo]]
    })
}

/// 以半径为 `radius` 的圆盘腐蚀二值图像.
///
/// 像素保留为前景, 当且仅当以它为中心的圆盘内 (限于图像内) 没有背景像素.
pub fn erode_disk(mask: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 || mask.is_empty() {
        return mask.to_owned();
    }
    let widths = disk_half_widths(radius);
    let background = row_prefix(mask, false);
    let mut ans = Array2::from_elem(mask.dim(), false);
    fill_indexed(&mut ans, |pos| mask[pos] && !disk_hits(&background, &widths, pos));
    ans
}

/// 以半径为 `radius` 的圆盘膨胀二值图像.
///
/// 像素成为前景, 当且仅当以它为中心的圆盘内 (限于图像内) 存在前景像素.
pub fn dilate_disk(mask: ArrayView2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 || mask.is_empty() {
        return mask.to_owned();
    }
    let widths = disk_half_widths(radius);
    let foreground = row_prefix(mask, true);
    let mut ans = Array2::from_elem(mask.dim(), false);
    fill_indexed(&mut ans, |pos| mask[pos] || disk_hits(&foreground, &widths, pos));
    ans
}

#[cfg(test)]
mod tests {
    use super::{dilate_disk, disk_half_widths, erode_disk};
    use ndarray::Array2;

    /// 逐像素枚举圆盘偏移的朴素实现.
    fn naive(mask: &Array2<bool>, r: usize, erode: bool) -> Array2<bool> {
        let (h, w) = mask.dim();
        let r = r as isize;
        Array2::from_shape_fn((h, w), |(i, j)| {
            let mut hit = false;
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let (y, x) = (i as isize + dy, j as isize + dx);
                    if y < 0 || x < 0 || y >= h as isize || x >= w as isize {
                        continue;
                    }
                    if mask[[y as usize, x as usize]] != erode {
                        hit = true;
                    }
                }
            }
            if erode {
                mask[[i, j]] && !hit
            } else {
                mask[[i, j]] || hit
            }
        })
    }

    fn pattern(h: usize, w: usize) -> Array2<bool> {
        Array2::from_shape_fn((h, w), |(i, j)| (i * 7 + j * 13) % 11 < 8 || (i > 5 && j < 9))
    }

    #[test]
    fn test_half_widths() {
        assert_eq!(disk_half_widths(0), vec![0]);
        assert_eq!(disk_half_widths(1), vec![0, 1, 0]);
        assert_eq!(disk_half_widths(2), vec![0, 1, 2, 1, 0]);
        assert_eq!(disk_half_widths(3), vec![0, 2, 2, 3, 2, 2, 0]);
    }

    #[test]
    fn test_against_naive() {
        let mask = pattern(17, 23);
        for r in [1, 2, 3, 5, 8] {
            assert_eq!(erode_disk(mask.view(), r), naive(&mask, r, true), "erode r={r}");
            assert_eq!(dilate_disk(mask.view(), r), naive(&mask, r, false), "dilate r={r}");
        }
    }

    #[test]
    fn test_single_pixel_dilation_is_disk() {
        let mut mask = Array2::from_elem((11, 11), false);
        mask[[5, 5]] = true;
        let d = dilate_disk(mask.view(), 3);
        assert_eq!(d.iter().filter(|v| **v).count(), 29);
        assert!(d[[2, 5]] && d[[5, 8]] && d[[7, 7]]);
        assert!(!d[[2, 4]] && !d[[8, 8]]);
    }

    #[test]
    fn test_border_is_ignored() {
        // 全前景图像腐蚀后不变.
        let full = Array2::from_elem((6, 9), true);
        assert_eq!(erode_disk(full.view(), 4), full);
        let empty = Array2::from_elem((6, 9), false);
        assert_eq!(dilate_disk(empty.view(), 4), empty);
    }
}
