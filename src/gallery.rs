use std::sync::Arc;

use log::{info, warn};

use crate::engine::ModelEngine;
use crate::error::{FaceIdError, Result};
use crate::store::GalleryStore;

/// 身份模型的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// 模型正在训练线程中，或重新分配失败
    Unbound,
    /// 从模型文件恢复
    Loaded,
    /// 新分配的未训练模型
    Fresh,
    /// 训练完成但未能保存
    Trained,
    /// 训练完成并已保存
    Persisted,
}

/// 图库中的一个身份，独占一个模型句柄
#[derive(Debug)]
pub struct Identity<M> {
    name: String,
    index: usize,
    model: Option<M>,
    state: ModelState,
}

impl<M> Identity<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 身份下标，即加入图库的顺序
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }
}

/// 身份加入图库的结果
#[derive(Debug)]
pub struct Admission {
    pub index: usize,
    pub state: ModelState,
    /// 模型文件存在但无法加载时的错误，此时身份会绑定一个新模型
    pub load_error: Option<FaceIdError>,
}

/// 管理所有身份及其模型句柄
///
/// 每个身份任意时刻只持有一个模型，替换前旧模型总是先被销毁。
pub struct Gallery<E: ModelEngine> {
    engine: Arc<E>,
    feature_len: usize,
    identities: Vec<Identity<E::Model>>,
    generation: u64,
}

impl<E: ModelEngine> Gallery<E> {
    pub fn new(engine: Arc<E>, feature_len: usize) -> Self {
        Self { engine, feature_len, identities: vec![], generation: 0 }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// 每次重新训练都会递增
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn identities(&self) -> &[Identity<E::Model>] {
        &self.identities
    }

    pub fn get(&self, index: usize) -> Option<&Identity<E::Model>> {
        self.identities.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&Identity<E::Model>> {
        self.identities.iter().find(|id| id.name == name)
    }

    /// 添加身份：存在模型文件则加载，否则分配一个新模型
    pub fn admit<S: GalleryStore + ?Sized>(&mut self, name: &str, store: &S) -> Result<Admission> {
        if self.find(name).is_some() {
            return Err(FaceIdError::DuplicateIdentity(name.to_string()));
        }

        let path = store.model_path(name);
        let mut load_error = None;
        let mut restored = None;
        if path.exists() {
            match self.engine.load(&path) {
                Ok(model) => {
                    info!("恢复 {} 的模型: {}", name, path.display());
                    restored = Some(model);
                }
                Err(e) => {
                    warn!("{}，将使用新模型", e);
                    load_error = Some(e);
                }
            }
        }

        let (model, state) = match restored {
            Some(model) => (model, ModelState::Loaded),
            None => (self.engine.create(self.feature_len)?, ModelState::Fresh),
        };

        let index = self.identities.len();
        self.identities.push(Identity {
            name: name.to_string(),
            index,
            model: Some(model),
            state,
        });
        Ok(Admission { index, state, load_error })
    }

    /// 重新训练前的准备：销毁所有模型并分配新模型，之前未绑定的身份也会获得新模型
    pub fn reset_models(&mut self) -> Result<()> {
        self.generation += 1;
        for i in 0..self.identities.len() {
            self.rebind_fresh(i)?;
        }
        Ok(())
    }

    /// 为指定身份换上一个新模型，旧模型会被销毁
    pub fn rebind_fresh(&mut self, index: usize) -> Result<()> {
        let identity = self
            .identities
            .get_mut(index)
            .ok_or_else(|| FaceIdError::UnknownIdentity(index.to_string()))?;
        if let Some(old) = identity.model.take() {
            self.engine.delete(old);
        }
        identity.state = ModelState::Unbound;
        let model = self.engine.create(self.feature_len)?;
        identity.model = Some(model);
        identity.state = ModelState::Fresh;
        Ok(())
    }

    /// 取出模型交给训练任务，身份暂时处于 `Unbound` 状态
    pub(crate) fn take_model(&mut self, index: usize) -> Option<E::Model> {
        let identity = self.identities.get_mut(index)?;
        let model = identity.model.take();
        if model.is_some() {
            identity.state = ModelState::Unbound;
        }
        model
    }

    /// 归还训练任务的模型，若身份仍持有模型则先销毁旧模型
    pub(crate) fn put_model(&mut self, index: usize, model: E::Model, state: ModelState) {
        match self.identities.get_mut(index) {
            Some(identity) => {
                if let Some(old) = identity.model.replace(model) {
                    self.engine.delete(old);
                }
                identity.state = state;
            }
            None => self.engine.delete(model),
        }
    }
}

impl<E: ModelEngine> Drop for Gallery<E> {
    fn drop(&mut self) {
        for identity in self.identities.drain(..) {
            if let Some(model) = identity.model {
                self.engine.delete(model);
            }
        }
    }
}
