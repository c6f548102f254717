use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::engine::LinearEngine;
use crate::loader::GrayscaleLoader;
use crate::predict::Prediction;
use crate::recognizer::Recognizer;
use crate::scheduler::SchedulerConfig;

#[derive(Parser, Debug, Clone)]
pub struct PredictCommand {
    /// 待识别的图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for PredictCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let recognizer = Recognizer::open(
            LinearEngine::new(),
            opts.store(),
            GrayscaleLoader::default(),
            SchedulerConfig { jobs: 1, ..Default::default() },
        )?;
        let prediction = recognizer.predict_path(&self.image)?;
        print_result(&prediction, self.output_format)
    }
}

fn print_result(prediction: &Prediction, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(prediction)?)
        }
        OutputFormat::Table => match prediction {
            Prediction::Match(c) => println!("{:.4}\t{}", c.score, c.name),
            Prediction::Empty => println!("图库为空"),
            Prediction::Unscored { failed } => println!("没有可用的模型 ({} 个评分失败)", failed),
        },
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
