use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{FaceIdError, Result};
use crate::loader::{FeatureVector, ImageLoader};
use crate::store::GalleryStore;

/// 一次训练使用的共享数据集
///
/// 所有身份的样本按身份顺序逐行拼接，`identity_index[i]` 为第 i 行所属身份的下标。
/// 构建完成后只读，被所有训练任务共享。
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    feature_len: usize,
    features: Vec<f32>,
    identity_index: Vec<usize>,
}

impl TrainingSet {
    pub fn new(feature_len: usize) -> Self {
        Self { feature_len, features: vec![], identity_index: vec![] }
    }

    /// 追加一行样本
    pub fn push(&mut self, identity: usize, feature: &FeatureVector) -> Result<()> {
        if feature.len() != self.feature_len {
            return Err(FaceIdError::DimensionMismatch {
                expected: self.feature_len,
                got: feature.len(),
            });
        }
        self.features.extend_from_slice(feature.as_slice());
        self.identity_index.push(identity);
        Ok(())
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// 样本总数
    pub fn samples(&self) -> usize {
        self.identity_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identity_index.is_empty()
    }

    /// 行优先的特征矩阵
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn identity_index(&self) -> &[usize] {
        &self.identity_index
    }

    /// 是否包含某个身份的样本
    pub fn contains(&self, identity: usize) -> bool {
        self.identity_index.contains(&identity)
    }
}

/// 数据集构建结果：数据集本身，以及没有可用样本的身份
#[derive(Debug)]
pub struct Assembled {
    pub set: TrainingSet,
    pub failures: Vec<(usize, FaceIdError)>,
}

/// 读取单个身份的全部样本，损坏的图片会被跳过
pub fn load_identity<S, L>(name: &str, store: &S, loader: &L) -> Result<Vec<FeatureVector>>
where
    S: GalleryStore + ?Sized,
    L: ImageLoader + ?Sized,
{
    let samples = store.list_samples(name).map_err(|e| {
        warn!("无法读取 {} 的样本目录: {}", name, e);
        FaceIdError::DataAssembly { identity: name.to_string() }
    })?;

    let features = samples
        .par_iter()
        .map(|path| loader.load_path(path))
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|r| match r {
            Ok(fv) if fv.len() == loader.feature_len() => Some(fv),
            Ok(fv) => {
                warn!("跳过长度异常的样本: {} != {}", fv.len(), loader.feature_len());
                None
            }
            Err(e) => {
                warn!("跳过样本: {}", e);
                None
            }
        })
        .collect::<Vec<_>>();

    if features.is_empty() {
        return Err(FaceIdError::DataAssembly { identity: name.to_string() });
    }
    debug!("{} 读取了 {} 张样本", name, features.len());
    Ok(features)
}

/// 按身份顺序构建共享数据集
///
/// # Arguments
///
/// * `members` - `(身份下标, 身份名称)`，按图库顺序排列
/// * `store` - 图库
/// * `loader` - 图片加载器
pub fn assemble<S, L>(members: &[(usize, &str)], store: &S, loader: &L) -> Assembled
where
    S: GalleryStore + ?Sized,
    L: ImageLoader + ?Sized,
{
    let mut set = TrainingSet::new(loader.feature_len());
    let mut failures = vec![];

    for &(index, name) in members {
        match load_identity(name, store, loader) {
            Ok(features) => {
                for fv in &features {
                    // load_identity 已经过滤了长度不符的向量
                    if let Err(e) = set.push(index, fv) {
                        warn!("{}: {}", name, e);
                    }
                }
            }
            Err(e) => {
                warn!("{}", e);
                failures.push((index, e));
            }
        }
    }

    info!("数据集构建完成，共 {} 个样本，{} 个身份不可用", set.samples(), failures.len());
    Assembled { set, failures }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use super::*;

    /// 用路径里的数字作为像素值的加载器
    struct FakeLoader;

    impl ImageLoader for FakeLoader {
        fn feature_len(&self) -> usize {
            2
        }

        fn load_path(&self, path: &Path) -> Result<FeatureVector> {
            let stem = path.file_stem().unwrap().to_string_lossy();
            match stem.parse::<f32>() {
                Ok(v) => Ok(FeatureVector::new(vec![v, v])),
                Err(_) => Err(FaceIdError::ImageDecode { path: path.into(), reason: "bad".into() }),
            }
        }

        fn load_bytes(&self, _: &[u8]) -> Result<FeatureVector> {
            unreachable!()
        }
    }

    struct FakeStore(HashMap<&'static str, Vec<&'static str>>);

    impl GalleryStore for FakeStore {
        fn list_identities(&self) -> Result<Vec<String>> {
            Ok(self.0.keys().map(|s| s.to_string()).collect())
        }

        fn list_samples(&self, identity: &str) -> Result<Vec<PathBuf>> {
            match self.0.get(identity) {
                Some(files) => Ok(files.iter().map(PathBuf::from).collect()),
                None => Err(std::io::Error::from(std::io::ErrorKind::NotFound).into()),
            }
        }

        fn model_path(&self, identity: &str) -> PathBuf {
            PathBuf::from(identity)
        }
    }

    fn store() -> FakeStore {
        FakeStore(HashMap::from([
            ("alice", vec!["0.1.png", "0.2.png"]),
            ("bob", vec!["0.7.png", "broken.png", "0.9.png"]),
            ("carol", vec!["broken.png"]),
            ("dave", vec![]),
        ]))
    }

    #[test]
    fn test_assemble_rows_in_member_order() {
        let store = store();
        let out = assemble(&[(0, "alice"), (1, "bob")], &store, &FakeLoader);
        assert!(out.failures.is_empty());
        assert_eq!(out.set.samples(), 4);
        assert_eq!(out.set.identity_index(), &[0, 0, 1, 1]);
        assert_eq!(out.set.features(), &[0.1, 0.1, 0.2, 0.2, 0.7, 0.7, 0.9, 0.9]);
    }

    #[test]
    fn test_assemble_isolates_unusable_identities() {
        let store = store();
        let members = [(0, "alice"), (1, "carol"), (2, "dave"), (3, "erin"), (4, "bob")];
        let out = assemble(&members, &store, &FakeLoader);

        let failed = out.failures.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        assert_eq!(failed, vec![1, 2, 3]);
        assert!(
            out.failures.iter().all(|(_, e)| matches!(e, FaceIdError::DataAssembly { .. }))
        );
        assert_eq!(out.set.identity_index(), &[0, 0, 4, 4]);
        assert!(!out.set.contains(1));
    }

    #[test]
    fn test_push_dimension_mismatch() {
        let mut set = TrainingSet::new(3);
        let err = set.push(0, &FeatureVector::new(vec![0.0; 2])).unwrap_err();
        assert!(matches!(err, FaceIdError::DimensionMismatch { expected: 3, got: 2 }));
        assert!(set.is_empty());
    }
}
