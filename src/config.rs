use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::engine::TrainParams;
use crate::scheduler::SchedulerConfig;
use crate::store::DirectoryStore;

static GALLERY_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "faceid", "faceid").expect("failed to get project dir");
    proj_dirs.data_dir().join("gallery")
});

fn default_gallery_dir() -> &'static str {
    GALLERY_DIR.to_str().unwrap_or("gallery")
}

#[derive(Parser, Debug, Clone)]
pub struct TrainOptions {
    /// 每个身份最多训练的轮数
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub epochs: usize,
    /// 学习率
    #[arg(long, value_name = "RATE", default_value_t = 0.01)]
    pub learning_rate: f32,
    /// 并行训练的线程数，默认为 CPU 核心数
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
    /// 等待全部训练完成的最长秒数，超时的身份会被标记为失败
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl TrainOptions {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let default = SchedulerConfig::default();
        SchedulerConfig {
            jobs: self.jobs.unwrap_or(default.jobs),
            timeout: self.timeout.map(Duration::from_secs),
            params: TrainParams { epochs: self.epochs, learning_rate: self.learning_rate },
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "faceid", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 图库目录，每个子目录对应一个身份
    #[arg(short, long, global = true, default_value = default_gallery_dir())]
    pub gallery: PathBuf,
    /// 模型目录，默认为 `<图库目录>/models/linear`
    #[arg(short, long, global = true, value_name = "DIR")]
    pub models: Option<PathBuf>,
    /// 样本文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, global = true, default_value = "jpg,jpeg,png,bmp,pgm,webp")]
    pub suffix: String,
}

impl Opts {
    pub fn store(&self) -> DirectoryStore {
        DirectoryStore::new(&self.gallery, self.models.clone(), &self.suffix)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 训练图库中的所有身份
    Train(TrainCommand),
    /// 识别图片中的身份
    Predict(PredictCommand),
}
