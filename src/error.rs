use std::path::PathBuf;

use thiserror::Error;

/// 人脸识别各环节的错误
///
/// 除 [`FaceIdError::Store`] 之外，其余错误都只影响单个身份或单张图片，
/// 调用方应当记录后继续处理其他身份。
#[derive(Debug, Error)]
pub enum FaceIdError {
    #[error("身份 {identity} 没有可用的样本图片")]
    DataAssembly { identity: String },

    #[error("无法解码图片 {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    #[error("无法加载模型 {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("无法保存模型 {path}: {reason}")]
    ModelSave { path: PathBuf, reason: String },

    #[error("训练失败: {0}")]
    Training(String),

    #[error("评分失败: {0}")]
    Scoring(String),

    #[error("维度不一致: 期望 {expected}，实际 {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("未知身份: {0}")]
    UnknownIdentity(String),

    #[error("身份已存在: {0}")]
    DuplicateIdentity(String),

    #[error("训练超时")]
    TimedOut,

    #[error("图库读取失败: {0}")]
    Store(#[from] std::io::Error),
}

pub type Result<T, E = FaceIdError> = std::result::Result<T, E>;
