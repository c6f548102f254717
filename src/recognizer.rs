use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use indicatif::ProgressBar;
use log::{info, warn};

use crate::dataset::{TrainingSet, assemble};
use crate::engine::ModelEngine;
use crate::error::{FaceIdError, Result};
use crate::gallery::{Admission, Gallery, ModelState};
use crate::loader::{FeatureVector, ImageLoader};
use crate::predict::{Prediction, predict};
use crate::scheduler::{SchedulerConfig, TrainingReport, TrainingScheduler};
use crate::store::GalleryStore;

/// 上一次构建的数据集，以及当时没有可用样本的身份
struct CachedDataset {
    set: Arc<TrainingSet>,
    unusable: Vec<usize>,
}

/// 人脸识别入口：管理图库、训练和预测
///
/// 训练期间持有图库写锁，预测持有读锁，因此预测不会看到替换了一半的模型。
pub struct Recognizer<E: ModelEngine, S: GalleryStore, L: ImageLoader> {
    gallery: RwLock<Gallery<E>>,
    store: S,
    loader: L,
    scheduler: TrainingScheduler,
    dataset: Mutex<Option<CachedDataset>>,
}

impl<E, S, L> Recognizer<E, S, L>
where
    E: ModelEngine + 'static,
    S: GalleryStore,
    L: ImageLoader,
{
    /// 创建一个空图库
    pub fn new(engine: E, store: S, loader: L, config: SchedulerConfig) -> Result<Self> {
        let gallery = Gallery::new(Arc::new(engine), loader.feature_len());
        Ok(Self {
            gallery: RwLock::new(gallery),
            store,
            loader,
            scheduler: TrainingScheduler::new(config)?,
            dataset: Mutex::new(None),
        })
    }

    /// 创建图库并加入存储中的所有身份
    pub fn open(engine: E, store: S, loader: L, config: SchedulerConfig) -> Result<Self> {
        let recognizer = Self::new(engine, store, loader, config)?;
        for name in recognizer.store.list_identities()? {
            recognizer.admit(&name)?;
        }
        info!("图库加载完成，共 {} 个身份", recognizer.len());
        Ok(recognizer)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn len(&self) -> usize {
        self.gallery.read().expect("failed to acquire rw lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.gallery.read().expect("failed to acquire rw lock").generation()
    }

    /// 按图库顺序返回所有身份及其模型状态
    pub fn identities(&self) -> Vec<(String, ModelState)> {
        let gallery = self.gallery.read().expect("failed to acquire rw lock");
        gallery.identities().iter().map(|id| (id.name().to_string(), id.state())).collect()
    }

    /// 加入一个身份，并使缓存的数据集失效
    pub fn admit(&self, name: &str) -> Result<Admission> {
        let mut gallery = self.gallery.write().expect("failed to acquire rw lock");
        let admission = gallery.admit(name, &self.store)?;
        self.invalidate();
        Ok(admission)
    }

    /// 丢弃缓存的数据集，下次训练会重新读取所有图片
    pub fn invalidate(&self) {
        *self.dataset.lock().expect("failed to acquire lock") = None;
    }

    /// 重新训练所有身份
    ///
    /// 先为每个身份换上新模型，再构建数据集并行训练。`reuse_dataset` 为 true 且存在缓存时
    /// 直接使用上次的数据集。单个身份的失败记录在返回的报告中。
    pub fn train(&self, reuse_dataset: bool, pb: &ProgressBar) -> Result<TrainingReport> {
        let mut gallery = self.gallery.write().expect("failed to acquire rw lock");
        gallery.reset_models()?;

        let (set, unusable) = {
            let mut cache = self.dataset.lock().expect("failed to acquire lock");
            match cache.as_ref() {
                Some(cached) if reuse_dataset => (cached.set.clone(), cached.unusable.clone()),
                _ => {
                    let members = gallery
                        .identities()
                        .iter()
                        .map(|id| (id.index(), id.name()))
                        .collect::<Vec<_>>();
                    let assembled = assemble(&members, &self.store, &self.loader);
                    let cached = CachedDataset {
                        set: Arc::new(assembled.set),
                        unusable: assembled.failures.into_iter().map(|(i, _)| i).collect(),
                    };
                    let out = (cached.set.clone(), cached.unusable.clone());
                    *cache = Some(cached);
                    out
                }
            }
        };

        let mut report = self.scheduler.run(&mut *gallery, set, &self.store, pb);
        for index in unusable {
            if let Some(identity) = gallery.get(index) {
                let name = identity.name().to_string();
                let err = FaceIdError::DataAssembly { identity: name.clone() };
                report.push_failure(index, &name, err);
            }
        }
        report.sort();

        let failed = report.failed().count();
        if failed > 0 {
            warn!("训练完成，{} 个身份失败", failed);
        } else {
            info!("训练完成，共 {} 个身份", report.entries.len());
        }
        Ok(report)
    }

    /// 预测已解码的特征向量
    pub fn predict_features(&self, features: &FeatureVector) -> Result<Prediction> {
        let gallery = self.gallery.read().expect("failed to acquire rw lock");
        predict(&*gallery, features)
    }

    /// 预测图片文件
    pub fn predict_path(&self, path: &Path) -> Result<Prediction> {
        let features = self.loader.load_path(path)?;
        self.predict_features(&features)
    }

    /// 预测内存中的图片，例如摄像头的一帧
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let features = self.loader.load_bytes(bytes)?;
        self.predict_features(&features)
    }
}
