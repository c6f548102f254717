mod linear;

use std::path::Path;

pub use linear::{LinearEngine, LinearModel};

use crate::error::Result;

/// 训练参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    /// 训练轮数
    pub epochs: usize,
    /// 学习率
    pub learning_rate: f32,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self { epochs: 1000, learning_rate: 0.01 }
    }
}

/// 二分类线性模型引擎
///
/// 模型句柄 `Model` 由调用方独占持有，`delete` 会消耗句柄并释放其资源。
/// 同一个引擎实例会被多个训练线程同时使用，但每个句柄同一时刻只属于一个线程。
pub trait ModelEngine: Send + Sync {
    type Model: Send + 'static;

    /// 创建一个未训练的模型，输入向量长度为 `feature_len`
    fn create(&self, feature_len: usize) -> Result<Self::Model>;

    /// 从指定路径加载模型
    fn load(&self, path: &Path) -> Result<Self::Model>;

    /// 保存模型到指定路径
    fn save(&self, model: &Self::Model, feature_len: usize, path: &Path) -> Result<()>;

    /// 训练模型
    ///
    /// `features` 为行优先排列的 `samples * feature_len` 矩阵，`labels` 长度为 `samples`，
    /// 取值为 +1 或 -1
    fn train(
        &self,
        model: &mut Self::Model,
        features: &[f32],
        labels: &[f32],
        samples: usize,
        feature_len: usize,
        params: &TrainParams,
    ) -> Result<()>;

    /// 计算单个输入向量的得分，不修改模型
    fn score(&self, model: &Self::Model, features: &[f32], feature_len: usize) -> Result<f32>;

    /// 销毁模型
    fn delete(&self, model: Self::Model);
}
