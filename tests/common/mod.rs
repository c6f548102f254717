#![allow(dead_code)]

use std::path::Path;

use image::{GrayImage, Luma};

/// 上半部分亮、下半部分暗的人脸，`shift` 控制分界线的位置
pub fn top_light(shift: u32) -> GrayImage {
    GrayImage::from_fn(64, 64, |x, y| {
        let v = if y < 32 + shift { 220 } else { 30 };
        Luma([v - (x % 3) as u8 * 5])
    })
}

/// 与 `top_light` 相反的明暗分布
pub fn bottom_light(shift: u32) -> GrayImage {
    GrayImage::from_fn(64, 64, |x, y| {
        let v = if y < 32 + shift { 30 } else { 220 };
        Luma([v + (x % 3) as u8 * 5])
    })
}

pub fn write_samples(dir: &Path, images: &[GrayImage]) {
    std::fs::create_dir_all(dir).unwrap();
    for (i, img) in images.iter().enumerate() {
        img.save(dir.join(format!("{i}.png"))).unwrap();
    }
}

/// alice 与 bob 各五张样本的图库
pub fn two_person_gallery(root: &Path) {
    let shifts = [0, 2, 4, 6, 8];
    write_samples(&root.join("alice"), &shifts.map(top_light));
    write_samples(&root.join("bob"), &shifts.map(bottom_light));
}
