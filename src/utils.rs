use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
        .expect("failed to build progress style")
        .progress_chars("##-")
}

/// 创建训练进度条，`visible` 为 false 时不输出任何内容
pub fn training_pb(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::no_length().with_style(pb_style());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}
