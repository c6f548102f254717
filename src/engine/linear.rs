use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{ModelEngine, TrainParams};
use crate::error::{FaceIdError, Result};

/// 线性分类器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    feature_len: usize,
    weights: Vec<f32>,
    bias: f32,
}

impl LinearModel {
    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    fn activation(&self, x: ArrayView1<f32>) -> f32 {
        ArrayView1::from(&self.weights).dot(&x) + self.bias
    }
}

/// 使用感知机规则训练的线性分类器
///
/// 得分为 `w·x + b`，正值表示属于该身份。某一轮没有分错的样本时提前结束训练。
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearEngine;

impl LinearEngine {
    pub fn new() -> Self {
        Self
    }
}

/// 序列化模型，缓冲区中最后一段数据的写入错误也会返回
fn write_model<W: Write>(model: &LinearModel, writer: W) -> std::result::Result<W, String> {
    let mut writer = BufWriter::new(writer);
    bincode::serialize_into(&mut writer, model).map_err(|e| e.to_string())?;
    writer.into_inner().map_err(|e| e.error().to_string())
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(FaceIdError::DimensionMismatch { expected, got });
    }
    Ok(())
}

impl ModelEngine for LinearEngine {
    type Model = LinearModel;

    fn create(&self, feature_len: usize) -> Result<LinearModel> {
        Ok(LinearModel { feature_len, weights: vec![0.0; feature_len], bias: 0.0 })
    }

    fn load(&self, path: &Path) -> Result<LinearModel> {
        let err = |reason: String| FaceIdError::ModelLoad { path: path.to_path_buf(), reason };
        let file = File::open(path).map_err(|e| err(e.to_string()))?;
        let model: LinearModel =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| err(e.to_string()))?;
        if model.weights.len() != model.feature_len {
            return Err(err(format!(
                "权重数量 {} 与输入长度 {} 不一致",
                model.weights.len(),
                model.feature_len
            )));
        }
        Ok(model)
    }

    fn save(&self, model: &LinearModel, feature_len: usize, path: &Path) -> Result<()> {
        check_len(model.feature_len, feature_len)?;
        let err = |reason: String| FaceIdError::ModelSave { path: path.to_path_buf(), reason };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
        }

        // 先写入临时文件再重命名，避免留下写了一半的模型
        let mut tmp_file = path.to_path_buf();
        tmp_file.set_extension("tmp");
        let file = File::create(&tmp_file).map_err(|e| err(e.to_string()))?;
        if let Err(reason) = write_model(model, file) {
            let _ = fs::remove_file(&tmp_file);
            return Err(err(reason));
        }
        fs::rename(&tmp_file, path).map_err(|e| err(e.to_string()))?;
        Ok(())
    }

    fn train(
        &self,
        model: &mut LinearModel,
        features: &[f32],
        labels: &[f32],
        samples: usize,
        feature_len: usize,
        params: &TrainParams,
    ) -> Result<()> {
        check_len(model.feature_len, feature_len)?;
        check_len(samples, labels.len())?;
        let x = ArrayView2::from_shape((samples, feature_len), features)
            .map_err(|e| FaceIdError::Training(e.to_string()))?;

        for epoch in 0..params.epochs {
            let mut errors = 0;
            for (row, &y) in x.rows().into_iter().zip(labels) {
                let predicted = if model.activation(row) >= 0.0 { 1.0 } else { -1.0 };
                let delta = params.learning_rate * (y - predicted);
                if delta == 0.0 {
                    continue;
                }
                errors += 1;
                model.weights.iter_mut().zip(row).for_each(|(w, &xi)| *w += delta * xi);
                model.bias += delta;
            }
            if errors == 0 {
                debug!("第 {} 轮收敛", epoch + 1);
                break;
            }
        }

        if model.weights.iter().any(|w| !w.is_finite()) || !model.bias.is_finite() {
            return Err(FaceIdError::Training("参数出现非有限值".to_string()));
        }
        Ok(())
    }

    fn score(&self, model: &LinearModel, features: &[f32], feature_len: usize) -> Result<f32> {
        check_len(model.feature_len, feature_len)?;
        check_len(feature_len, features.len())?;
        Ok(model.activation(ArrayView1::from(features)))
    }

    fn delete(&self, model: LinearModel) {
        drop(model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<f32>, Vec<f32>) {
        // 前两行第一维亮，后两行第二维亮
        let x = vec![1.0, 0.0, 0.9, 0.1, 0.0, 1.0, 0.1, 0.8];
        let y = vec![1.0, 1.0, -1.0, -1.0];
        (x, y)
    }

    #[test]
    fn test_create_is_untrained() {
        let engine = LinearEngine::new();
        let model = engine.create(3).unwrap();
        assert_eq!(engine.score(&model, &[0.5, 0.5, 0.5], 3).unwrap(), 0.0);
    }

    #[test]
    fn test_train_separates_classes() {
        let engine = LinearEngine::new();
        let mut model = engine.create(2).unwrap();
        let (x, y) = separable();
        engine.train(&mut model, &x, &y, 4, 2, &TrainParams::default()).unwrap();

        for (row, label) in x.chunks(2).zip(&y) {
            let score = engine.score(&model, row, 2).unwrap();
            assert_eq!(score >= 0.0, *label > 0.0, "row {:?} score {}", row, score);
        }
    }

    #[test]
    fn test_score_dimension_mismatch() {
        let engine = LinearEngine::new();
        let model = engine.create(4).unwrap();
        let err = engine.score(&model, &[0.0; 3], 3).unwrap_err();
        assert!(matches!(err, FaceIdError::DimensionMismatch { expected: 4, got: 3 }));
    }

    #[test]
    fn test_train_label_mismatch() {
        let engine = LinearEngine::new();
        let mut model = engine.create(2).unwrap();
        let err = engine
            .train(&mut model, &[0.0; 4], &[1.0], 2, 2, &TrainParams::default())
            .unwrap_err();
        assert!(matches!(err, FaceIdError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_save_load_same_score() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("models/linear/alice.model");

        let engine = LinearEngine::new();
        let mut model = engine.create(2).unwrap();
        let (x, y) = separable();
        engine.train(&mut model, &x, &y, 4, 2, &TrainParams::default()).unwrap();
        engine.save(&model, 2, &path).unwrap();

        let restored = engine.load(&path).unwrap();
        assert_eq!(restored, model);
        assert!(!path.with_extension("tmp").exists());
    }

    /// 只能再写入 `left` 字节的磁盘
    #[derive(Debug)]
    struct ShortDisk {
        left: usize,
    }

    impl Write for ShortDisk {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.len() > self.left {
                return Err(std::io::Error::other("no space left on device"));
            }
            self.left -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_model_reports_final_flush_error() {
        let engine = LinearEngine::new();
        let model = engine.create(2304).unwrap();

        // 第一次整块刷新成功，剩余部分只在最后刷新时写入
        let err = write_model(&model, ShortDisk { left: 9000 }).unwrap_err();
        assert!(err.contains("no space left"));

        let disk = write_model(&model, ShortDisk { left: 20000 }).unwrap();
        assert!(disk.left < 20000 - 9000);
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = LinearEngine::new();

        let missing = dir.path().join("missing.model");
        assert!(matches!(engine.load(&missing), Err(FaceIdError::ModelLoad { .. })));

        let corrupt = dir.path().join("corrupt.model");
        fs::write(&corrupt, b"not a model").unwrap();
        assert!(matches!(engine.load(&corrupt), Err(FaceIdError::ModelLoad { .. })));
    }
}
