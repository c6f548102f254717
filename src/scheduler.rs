use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use indicatif::ProgressBar;
use log::{error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::dataset::TrainingSet;
use crate::engine::{ModelEngine, TrainParams};
use crate::error::{FaceIdError, Result};
use crate::gallery::{Gallery, ModelState};
use crate::labels::one_vs_rest;
use crate::metrics;
use crate::store::GalleryStore;

/// 训练调度配置
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// 并行训练的线程数
    pub jobs: usize,
    /// 等待全部训练任务的最长时间，`None` 表示一直等待
    pub timeout: Option<Duration>,
    pub params: TrainParams,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { jobs: num_cpus::get(), timeout: None, params: TrainParams::default() }
    }
}

/// 单个身份的训练结果
#[derive(Debug)]
pub struct IdentityReport {
    pub index: usize,
    pub name: String,
    /// 成功时为训练加保存的耗时
    pub result: Result<Duration>,
}

/// 一次训练的汇总，按身份下标排序
#[derive(Debug, Default)]
pub struct TrainingReport {
    pub generation: u64,
    pub entries: Vec<IdentityReport>,
}

impl TrainingReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &IdentityReport> {
        self.entries.iter().filter(|e| e.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &IdentityReport> {
        self.entries.iter().filter(|e| e.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.result.is_ok())
    }

    pub fn get(&self, name: &str) -> Option<&IdentityReport> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn push_failure(&mut self, index: usize, name: &str, err: FaceIdError) {
        self.entries.push(IdentityReport { index, name: name.to_string(), result: Err(err) });
    }

    pub(crate) fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.index);
    }
}

/// 训练任务返回的模型及结果
struct TaskOutput<M> {
    index: usize,
    model: M,
    state: ModelState,
    result: Result<Duration>,
}

/// 单个身份的训练任务：生成标签、训练、保存，再把模型送回收集端
struct TrainTask<E: ModelEngine> {
    engine: Arc<E>,
    set: Arc<TrainingSet>,
    index: usize,
    name: String,
    path: PathBuf,
    params: TrainParams,
    /// 收集端超时后置为 true，写锁会等待正在保存的任务
    abandoned: Arc<RwLock<bool>>,
    tx: Sender<TaskOutput<E::Model>>,
}

impl<E: ModelEngine> TrainTask<E> {
    fn run(self, mut model: E::Model) {
        info!("开始训练 {}", self.name);
        let start = Instant::now();

        let trained = guard_panic(&self.name, || {
            let labels = one_vs_rest(self.set.identity_index(), self.index);
            self.engine.train(
                &mut model,
                self.set.features(),
                &labels,
                self.set.samples(),
                self.set.feature_len(),
                &self.params,
            )
        });

        // 持有读锁直到结果发出，超时判定与保存、发送互斥
        let abandoned = self.abandoned.read().expect("failed to acquire rw lock");
        if *abandoned {
            warn!("{} 在超时后才完成训练，结果被丢弃", self.name);
            self.engine.delete(model);
            return;
        }

        let (state, result) = match trained {
            Err(e) => {
                warn!("{} 训练失败: {}", self.name, e);
                (ModelState::Fresh, Err(e))
            }
            Ok(()) => {
                let feature_len = self.set.feature_len();
                match guard_panic(&self.name, || self.engine.save(&model, feature_len, &self.path)) {
                    Err(e) => {
                        warn!("{} 保存失败: {}", self.name, e);
                        (ModelState::Trained, Err(e))
                    }
                    Ok(()) => {
                        let elapsed = start.elapsed();
                        info!("{} 训练完成，耗时 {:.2}s", self.name, elapsed.as_secs_f32());
                        (ModelState::Persisted, Ok(elapsed))
                    }
                }
            }
        };

        let output = TaskOutput { index: self.index, model, state, result };
        if let Err(e) = self.tx.send(output) {
            self.engine.delete(e.into_inner().model);
        }
        drop(abandoned);
    }
}

/// 把引擎内部的 panic 转换为该身份的训练错误，模型仍归任务所有
fn guard_panic<T>(name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("{} 的训练任务发生 panic", name);
        Err(FaceIdError::Training("训练任务异常退出".to_string()))
    })
}

/// 为每个身份启动一个训练任务，并等待全部完成
pub struct TrainingScheduler {
    pool: ThreadPool,
    config: SchedulerConfig,
}

impl TrainingScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.jobs.max(1))
            .thread_name(|i| format!("faceid-train-{i}"))
            .panic_handler(|_| error!("训练任务异常退出"))
            .build()
            .map_err(|e| FaceIdError::Training(e.to_string()))?;
        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 训练 `set` 中出现的每个身份，并把模型保存到 `store` 指定的位置
    ///
    /// 所有任务只读共享 `set`，每个任务独占自己的标签向量和模型。单个身份失败不影响其他身份。
    /// 超时的身份不会写入模型文件。
    pub fn run<E, S>(
        &self,
        gallery: &mut Gallery<E>,
        set: Arc<TrainingSet>,
        store: &S,
        pb: &ProgressBar,
    ) -> TrainingReport
    where
        E: ModelEngine + 'static,
        S: GalleryStore + ?Sized,
    {
        let mut report = TrainingReport { generation: gallery.generation(), entries: vec![] };
        let (tx, rx) = unbounded::<TaskOutput<E::Model>>();
        let abandoned = Arc::new(RwLock::new(false));
        let mut pending = BTreeMap::new();

        let members = gallery
            .identities()
            .iter()
            .filter(|id| id.model().is_some() && set.contains(id.index()))
            .map(|id| (id.index(), id.name().to_string()))
            .collect::<Vec<_>>();

        pb.set_length(members.len() as u64);

        for (index, name) in members {
            let Some(model) = gallery.take_model(index) else {
                continue;
            };
            pending.insert(index, name.clone());
            let task = TrainTask {
                engine: gallery.engine().clone(),
                set: set.clone(),
                index,
                path: store.model_path(&name),
                name,
                params: self.config.params,
                abandoned: abandoned.clone(),
                tx: tx.clone(),
            };
            self.pool.spawn(move || task.run(model));
        }
        drop(tx);

        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        while !pending.is_empty() {
            let received = match deadline {
                Some(deadline) => rx.recv_deadline(deadline),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(output) => collect(gallery, &mut pending, &mut report, output, pb),
                Err(RecvTimeoutError::Timeout) => {
                    *abandoned.write().expect("failed to acquire rw lock") = true;
                    // 拿到写锁时，所有已保存的任务都已把结果放进通道
                    for output in rx.try_iter() {
                        collect(gallery, &mut pending, &mut report, output, pb);
                    }
                    for (index, name) in std::mem::take(&mut pending) {
                        warn!("{} 训练超时", name);
                        metrics::observe_training(None);
                        rebind(gallery, index);
                        report.push_failure(index, &name, FaceIdError::TimedOut);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for (index, name) in std::mem::take(&mut pending) {
                        metrics::observe_training(None);
                        rebind(gallery, index);
                        report.push_failure(
                            index,
                            &name,
                            FaceIdError::Training("训练任务异常退出".to_string()),
                        );
                    }
                }
            }
        }

        report.sort();
        report
    }
}

/// 收回一个任务的模型并记录结果
fn collect<E: ModelEngine>(
    gallery: &mut Gallery<E>,
    pending: &mut BTreeMap<usize, String>,
    report: &mut TrainingReport,
    output: TaskOutput<E::Model>,
    pb: &ProgressBar,
) {
    let Some(name) = pending.remove(&output.index) else {
        gallery.engine().delete(output.model);
        return;
    };
    pb.set_message(name.clone());
    pb.inc(1);
    metrics::observe_training(output.result.as_ref().ok().copied());
    match output.state {
        // 训练失败的模型参数不可信，换成新模型
        ModelState::Fresh => {
            gallery.engine().delete(output.model);
            rebind(gallery, output.index);
        }
        state => gallery.put_model(output.index, output.model, state),
    }
    report.entries.push(IdentityReport { index: output.index, name, result: output.result });
}

fn rebind<E: ModelEngine>(gallery: &mut Gallery<E>, index: usize) {
    if let Err(e) = gallery.rebind_fresh(index) {
        error!("无法为身份 {} 分配新模型: {}", index, e);
    }
}
