use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info};

use crate::cli::SubCommandExtend;
use crate::config::{Opts, TrainOptions};
use crate::engine::LinearEngine;
use crate::loader::GrayscaleLoader;
use crate::recognizer::Recognizer;
use crate::{metrics, utils};

#[derive(Parser, Debug, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub train: TrainOptions,
    /// 不显示进度条
    #[arg(long)]
    pub no_progress: bool,
}

impl SubCommandExtend for TrainCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let store = opts.store();
        info!("打开图库: {}", store.root().display());
        let recognizer = Recognizer::open(
            LinearEngine::new(),
            store,
            GrayscaleLoader::default(),
            self.train.scheduler_config(),
        )?;

        let pb = utils::training_pb(!self.no_progress);
        let report = recognizer.train(false, &pb)?;
        pb.finish_and_clear();

        for entry in &report.entries {
            match &entry.result {
                Ok(elapsed) => println!("[OK] {} ({:.2}s)", entry.name, elapsed.as_secs_f32()),
                Err(e) => eprintln!("[ERR] {}: {}", entry.name, e),
            }
        }

        debug!("{}", metrics::gather_text());

        let failed = report.failed().count();
        if failed > 0 {
            bail!("{} 个身份训练失败", failed);
        }
        Ok(())
    }
}
