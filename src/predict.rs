use log::{debug, warn};
use serde::Serialize;

use crate::engine::ModelEngine;
use crate::error::{FaceIdError, Result};
use crate::gallery::Gallery;
use crate::loader::FeatureVector;
use crate::metrics;

/// 得分最高的身份
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub index: usize,
    pub name: String,
    pub score: f32,
    /// 产生该结果的模型代数
    pub generation: u64,
}

/// 预测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Prediction {
    /// 图库为空，无法预测
    Empty,
    /// 图库不为空，但没有任何模型能给出得分
    Unscored { failed: usize },
    Match(Candidate),
}

impl Prediction {
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Prediction::Match(c) => Some(c),
            _ => None,
        }
    }
}

/// 返回最大得分及其位置，得分相同时取最先出现的
pub fn argmax<I>(scores: I) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = (usize, f32)>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, score) in scores {
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((i, score)),
        }
    }
    best
}

/// 用图库中每个身份的模型为输入打分，返回得分最高的身份
///
/// 单个模型评分失败或得分不是有限值时，该身份不参与比较。
/// 尚未训练的 `Fresh` 模型同样参与比较，其得分由引擎决定（线性模型为 0）。
pub fn predict<E: ModelEngine>(gallery: &Gallery<E>, features: &FeatureVector) -> Result<Prediction> {
    if gallery.is_empty() {
        metrics::inc_prediction("empty");
        return Ok(Prediction::Empty);
    }
    if features.len() != gallery.feature_len() {
        return Err(FaceIdError::DimensionMismatch {
            expected: gallery.feature_len(),
            got: features.len(),
        });
    }

    let engine = gallery.engine();
    let mut failed = 0;
    let scores = gallery
        .identities()
        .iter()
        .filter_map(|id| {
            let model = id.model()?;
            match engine.score(model, features.as_slice(), features.len()) {
                Ok(score) if score.is_finite() => {
                    debug!("{}: {:.4}", id.name(), score);
                    Some((id.index(), score))
                }
                Ok(score) => {
                    warn!("{} 的得分无效: {}", id.name(), score);
                    failed += 1;
                    None
                }
                Err(e) => {
                    warn!("{} 评分失败: {}", id.name(), e);
                    failed += 1;
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    let Some((index, score)) = argmax(scores) else {
        metrics::inc_prediction("unscored");
        return Ok(Prediction::Unscored { failed });
    };
    let Some(identity) = gallery.get(index) else {
        return Err(FaceIdError::UnknownIdentity(index.to_string()));
    };

    metrics::inc_prediction("match");
    metrics::observe_score(score);
    Ok(Prediction::Match(Candidate {
        index,
        name: identity.name().to_string(),
        score,
        generation: gallery.generation(),
    }))
}
