//! 连通区域: 标记, 清除贴边区域, 填充空洞, 最大区域.

use std::collections::VecDeque;

use ndarray::{Array2, ArrayView2};

use crate::{Area2d, Idx2d};

/// 像素相邻规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Connectivity {
    /// 上下左右.
    Four,

    /// 上下左右以及四个对角.
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(isize, isize)] {
        const N4: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const N8: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &N4,
            Connectivity::Eight => &N8,
        }
    }

    /// `pos` 在形状为 `(h, w)` 的图像内的所有相邻位置.
    fn neighbors(&self, (h, w): Idx2d, (height, width): Idx2d) -> impl Iterator<Item = Idx2d> {
        self.offsets().iter().filter_map(move |&(dh, dw)| {
            let nh = h.checked_add_signed(dh)?;
            let nw = w.checked_add_signed(dw)?;
            (nh < height && nw < width).then_some((nh, nw))
        })
    }
}

/// 从 `seeds` 出发, 在满足 `pred` 的像素中做广度优先搜索. 已访问的像素记录在 `vis`
/// 中, 返回本次新访问的所有像素.
fn flood<I, P>(shape: Idx2d, seeds: I, conn: Connectivity, vis: &mut Array2<bool>, pred: P) -> Area2d
where
    I: IntoIterator<Item = Idx2d>,
    P: Fn(Idx2d) -> bool,
{
    let mut area = Area2d::with_capacity(16);
    let mut bfs_q: VecDeque<Idx2d> = seeds
        .into_iter()
        .filter(|p| {
            let ok = !vis[*p] && pred(*p);
            if ok {
                vis[*p] = true;
            }
            ok
        })
        .collect();
    while let Some(cur) = bfs_q.pop_front() {
        area.push(cur);
        for next in conn.neighbors(cur, shape) {
            if !vis[next] && pred(next) {
                vis[next] = true;
                bfs_q.push_back(next);
            }
        }
    }
    area
}

/// 图像边界上的所有位置.
fn border_positions((h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
    let rows = (0..w).flat_map(move |j| [(0, j), (h.saturating_sub(1), j)]);
    let cols = (0..h).flat_map(move |i| [(i, 0), (i, w.saturating_sub(1))]);
    rows.chain(cols).filter(move |_| h > 0 && w > 0)
}

/// 按行优先顺序获取前景的所有连通区域. 区域的排列顺序与它们第一个像素在行优先
/// 扫描中出现的顺序一致.
pub(crate) fn components(mask: ArrayView2<bool>, conn: Connectivity) -> Vec<Area2d> {
    let shape = mask.dim();
    let mut vis = Array2::from_elem(shape, false);
    let mut ans = Vec::new();
    for (pos, &v) in mask.indexed_iter() {
        if v && !vis[pos] {
            ans.push(flood(shape, [pos], conn, &mut vis, |p| mask[p]));
        }
    }
    ans
}

/// 标记前景的连通区域. 标签从 1 开始按行优先顺序分配, 背景为 0.
///
/// # 返回值
///
/// `(标签图, 区域个数)`.
pub fn label_components(mask: ArrayView2<bool>, conn: Connectivity) -> (Array2<u32>, usize) {
    let areas = components(mask, conn);
    let mut labels = Array2::<u32>::zeros(mask.dim());
    for (k, area) in areas.iter().enumerate() {
        let label = k as u32 + 1;
        for &pos in area {
            labels[pos] = label;
        }
    }
    (labels, areas.len())
}

/// 清除所有与图像边界相连的前景区域.
pub fn clear_border(mask: ArrayView2<bool>, conn: Connectivity) -> Array2<bool> {
    let shape = mask.dim();
    let mut ans = mask.to_owned();
    let mut vis = Array2::from_elem(shape, false);
    for pos in flood(shape, border_positions(shape), conn, &mut vis, |p| mask[p]) {
        ans[pos] = false;
    }
    ans
}

/// 填充前景中的空洞: 不能以 4-邻域从图像边界到达的背景像素全部变为前景.
pub fn fill_holes(mask: ArrayView2<bool>) -> Array2<bool> {
    let shape = mask.dim();
    let mut outside = Array2::from_elem(shape, false);
    flood(shape, border_positions(shape), Connectivity::Four, &mut outside, |p| !mask[p]);
    outside.mapv_into(|v| !v)
}

/// 面积最大的前景连通区域. 多个区域面积相同时取行优先顺序中最先出现的一个.
///
/// # 返回值
///
/// 只含该区域的掩膜与区域面积. 没有前景时返回全背景掩膜与 0.
pub fn largest_component(mask: ArrayView2<bool>, conn: Connectivity) -> (Array2<bool>, usize) {
    let mut ans = Array2::from_elem(mask.dim(), false);
    let areas = components(mask, conn);
    // max_by_key 在并列时返回最后一个, 因此先反转.
    let Some(best) = areas.iter().rev().max_by_key(|a| a.len()) else {
        return (ans, 0);
    };
    for &pos in best {
        ans[pos] = true;
    }
    (ans, best.len())
}
