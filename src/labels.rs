/// 正样本标签
pub const POSITIVE: f32 = 1.0;
/// 负样本标签
pub const NEGATIVE: f32 = -1.0;

/// 一对多标签：样本属于 `target` 时为 +1，否则为 -1
///
/// 每次调用都会返回新的标签向量，不修改共享的身份下标
pub fn one_vs_rest(identity_index: &[usize], target: usize) -> Vec<f32> {
    identity_index
        .iter()
        .map(|&i| if i == target { POSITIVE } else { NEGATIVE })
        .collect()
}
