use std::sync::LazyLock;
use std::time::Duration;

use prometheus::*;

static METRIC_TRAINED_IDENTITY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "faceid_trained_identity_count",
        "count of the identities trained, by outcome",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_TRAINING_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "faceid_training_duration",
        "duration of the per-identity training and saving in seconds",
        exponential_buckets(0.01, 2.0, 16).unwrap()
    )
    .unwrap()
});

static METRIC_PREDICTION_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "faceid_prediction_count",
        "count of the predictions, by outcome",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_PREDICTION_SCORE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "faceid_prediction_score",
        "score of the winning identity",
        (-10..=10).map(|x| x as f64).collect()
    )
    .unwrap()
});

/// 记录一个身份的训练结果，`None` 表示失败
pub fn observe_training(elapsed: Option<Duration>) {
    match elapsed {
        Some(elapsed) => {
            METRIC_TRAINED_IDENTITY_COUNT.with_label_values(&["ok"]).inc();
            METRIC_TRAINING_DURATION.observe(elapsed.as_secs_f64());
        }
        None => METRIC_TRAINED_IDENTITY_COUNT.with_label_values(&["failed"]).inc(),
    }
}

/// 增加预测计数，`outcome` 为 match / empty / unscored
pub fn inc_prediction(outcome: &str) {
    METRIC_PREDICTION_COUNT.with_label_values(&[outcome]).inc();
}

pub fn observe_score(score: f32) {
    METRIC_PREDICTION_SCORE.observe(score as f64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&gather()).unwrap_or_default()
}
