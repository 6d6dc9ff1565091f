//! 人工标注的内区带.
//!
//! 人工掩膜以 `<目录>/<roi 名称>.tif` 的形式提供, 任意颜色通道大于零的像素视为前景.
//! 判定在原始位深下进行, 8-bit, 16-bit 与浮点图像中任何非零值都算前景.

use std::path::{Path, PathBuf};

use log::debug;
use ndarray::Array2;

use crate::Result;

/// ROI `roi_name` 对应的人工掩膜文件路径.
pub fn manual_mask_path(dir: &Path, roi_name: &str) -> PathBuf {
    dir.join(format!("{roi_name}.tif"))
}

/// 加载 ROI `roi_name` 的人工内区带.
///
/// `dir` 为 `None` 或文件不存在时返回 `Ok(None)`. 文件存在但无法解码时返回
/// [`crate::Error::Image`].
pub fn load_manual_inner_zone(dir: Option<&Path>, roi_name: &str) -> Result<Option<Array2<bool>>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    let path = manual_mask_path(dir, roi_name);
    if !path.is_file() {
        return Ok(None);
    }
    // 转为 8-bit 会把 16-bit 图像中的小值截成 0.
    let img = image::open(&path)?.into_rgb32f();
    let (width, height) = img.dimensions();
    let mask = Array2::from_shape_fn((height as usize, width as usize), |(h, w)| {
        img.get_pixel(w as u32, h as u32).0.iter().any(|c| *c > 0.0)
    });
    debug!("加载人工掩膜 {}", path.display());
    Ok(Some(mask))
}
