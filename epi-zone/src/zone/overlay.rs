//! 区带叠加可视化.
//!
//! 原始图像先按高 8 位转为 8-bit, 经伽马校正后, 外区带像素向绿色混合, 内区带像素再向
//! 红色混合. 结果只用于人工检查, 不参与任何统计.

use std::path::Path;

use ndarray::{Array3, ArrayView2, ArrayView3};

use crate::{Error, OverlayStyle, Result};

/// 外区带颜色.
pub const OUTER_COLOR: [u8; 3] = [0, 255, 0];

/// 内区带颜色.
pub const INNER_COLOR: [u8; 3] = [255, 0, 0];

/// 8-bit 伽马校正查找表.
fn gamma_lut(gamma: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = ((v as f64 / 255.0).powf(gamma) * 255.0).round().min(255.0) as u8;
    }
    lut
}

/// 将 `zone` 中的像素以比例 `alpha` 向 `color` 混合. 结果截断为整数.
fn blend(img: &mut Array3<u8>, zone: ArrayView2<bool>, color: [u8; 3], alpha: f64) {
    for ((h, w), _) in zone.indexed_iter().filter(|(_, z)| **z) {
        for (c, &target) in color.iter().enumerate() {
            let pix = &mut img[[h, w, c]];
            *pix = (f64::from(target) * alpha + f64::from(*pix) * (1.0 - alpha)) as u8;
        }
    }
}

/// 绘制区带叠加图 `(高, 宽, 3)`.
///
/// 三个输入的高和宽必须一致, 原始图像必须为 3 通道, 否则返回
/// [`Error::ShapeMismatch`].
pub fn render_overlay(
    raw: ArrayView3<u16>,
    outer: ArrayView2<bool>,
    inner: ArrayView2<bool>,
    style: &OverlayStyle,
) -> Result<Array3<u8>> {
    let (h, w, _) = raw.dim();
    Error::check_shape(&[h, w, 3], raw.shape())?;
    Error::check_shape(&[h, w], outer.shape())?;
    Error::check_shape(&[h, w], inner.shape())?;

    let lut = gamma_lut(style.gamma);
    let mut img = raw.mapv(|v| lut[usize::from(v >> 8)]);
    blend(&mut img, outer, OUTER_COLOR, style.alpha);
    blend(&mut img, inner, INNER_COLOR, style.alpha);
    Ok(img)
}

/// 将叠加图保存为图像文件, 格式由扩展名决定 (如 `png`, `tif`).
pub fn save_overlay<P: AsRef<Path>>(overlay: ArrayView3<u8>, path: P) -> Result<()> {
    let (height, width, channels) = overlay.dim();
    if channels != 3 {
        return Err(Error::InvalidArgument(format!(
            "叠加图必须为 3 通道, 实际形状 {:?}",
            overlay.shape()
        )));
    }
    let mut buf = image::RgbImage::new(width as u32, height as u32);
    for ((h, w, c), &v) in overlay.indexed_iter() {
        buf.get_pixel_mut(w as u32, h as u32).0[c] = v;
    }
    buf.save(path)?;
    Ok(())
}
