use clap::Parser;

use faceid::cli::SubCommandExtend;
use faceid::config::{Opts, SubCommand};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Train(config) => config.run(&opts),
        SubCommand::Predict(config) => config.run(&opts),
    }
}
