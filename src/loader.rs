use std::path::Path;

use image::DynamicImage;
use image::imageops::FilterType;

use crate::error::{FaceIdError, Result};

/// 人脸图片边长
pub const IMG_SIZE: u32 = 48;
/// 图片通道数，固定为灰度
pub const IMG_CHANNEL: u32 = 1;
/// 特征向量长度
pub const IMG_TOTAL_SIZE: usize = (IMG_SIZE * IMG_SIZE * IMG_CHANNEL) as usize;

/// 一张图片解码后的特征向量，取值范围为 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// 将图片转换为固定长度特征向量
pub trait ImageLoader: Send + Sync {
    /// 特征向量长度
    fn feature_len(&self) -> usize;

    /// 读取并解码图片文件
    fn load_path(&self, path: &Path) -> Result<FeatureVector>;

    /// 解码内存中的图片
    fn load_bytes(&self, bytes: &[u8]) -> Result<FeatureVector>;
}

/// 灰度缩放加载器：解码、转灰度、缩放到 `size x size`，再除以 255
#[derive(Debug, Clone, Copy)]
pub struct GrayscaleLoader {
    size: u32,
}

impl GrayscaleLoader {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    fn to_feature(&self, img: DynamicImage) -> FeatureVector {
        let gray = img.resize_exact(self.size, self.size, FilterType::Triangle).to_luma8();
        FeatureVector(gray.into_raw().into_iter().map(|p| p as f32 / 255.).collect())
    }
}

impl Default for GrayscaleLoader {
    fn default() -> Self {
        Self::new(IMG_SIZE)
    }
}

impl ImageLoader for GrayscaleLoader {
    fn feature_len(&self) -> usize {
        (self.size * self.size * IMG_CHANNEL) as usize
    }

    fn load_path(&self, path: &Path) -> Result<FeatureVector> {
        let img = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| FaceIdError::ImageDecode { path: path.to_path_buf(), reason: e.to_string() })?
            .decode()
            .map_err(|e| FaceIdError::ImageDecode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(self.to_feature(img))
    }

    fn load_bytes(&self, bytes: &[u8]) -> Result<FeatureVector> {
        let img = image::load_from_memory(bytes).map_err(|e| FaceIdError::ImageDecode {
            path: "<memory>".into(),
            reason: e.to_string(),
        })?;
        Ok(self.to_feature(img))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{GrayImage, Luma};

    use super::*;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_load_bytes_normalized() {
        let img = GrayImage::from_pixel(96, 64, Luma([255]));
        let fv = GrayscaleLoader::default().load_bytes(&png_bytes(&img)).unwrap();
        assert_eq!(fv.len(), IMG_TOTAL_SIZE);
        assert!(fv.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_load_bytes_range() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([(x * 12) as u8]));
        let loader = GrayscaleLoader::new(8);
        let fv = loader.load_bytes(&png_bytes(&img)).unwrap();
        assert_eq!(fv.len(), loader.feature_len());
        assert!(fv.as_slice().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_load_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = GrayscaleLoader::default().load_path(&path).unwrap_err();
        assert!(matches!(err, FaceIdError::ImageDecode { .. }));
        assert!(GrayscaleLoader::default().load_bytes(b"").is_err());
    }
}
