use std::path::{Path, PathBuf};

use log::debug;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::Result;

/// 与样本图片放在同一目录下、需要跳过的保留文件名
pub const RESERVED_MODEL_FILE: &str = "model";
/// 模型文件后缀
pub const MODEL_EXTENSION: &str = "model";

/// 身份图库的存储布局
pub trait GalleryStore: Send + Sync {
    /// 按固定顺序列出所有身份
    fn list_identities(&self) -> Result<Vec<String>>;

    /// 列出某个身份的全部样本图片，不包含保留的模型文件
    fn list_samples(&self, identity: &str) -> Result<Vec<PathBuf>>;

    /// 某个身份模型文件的路径
    fn model_path(&self, identity: &str) -> PathBuf;
}

/// 基于目录的图库：`<root>/<身份>/*.jpg`，模型保存在 `<models>/<身份>.model`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    models: PathBuf,
    suffix: Regex,
}

impl DirectoryStore {
    /// 创建图库
    ///
    /// # Arguments
    ///
    /// * `root` - 图库根目录，每个子目录对应一个身份
    /// * `models` - 模型目录，默认为 `<root>/models/linear`
    /// * `suffix` - 样本图片的后缀名，多个后缀用逗号分隔
    pub fn new(root: impl Into<PathBuf>, models: Option<PathBuf>, suffix: &str) -> Self {
        let root = root.into();
        let models = models.unwrap_or_else(|| root.join("models").join("linear"));
        let alternatives = suffix.split(',').map(regex::escape).collect::<Vec<_>>();
        let re_suf = format!("(?i)^({})$", alternatives.join("|"));
        let suffix = Regex::new(&re_suf).expect("failed to build regex");
        Self { root, models, suffix }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> &Path {
        &self.models
    }

    fn is_sample(&self, path: &Path) -> bool {
        if path.file_name().and_then(|s| s.to_str()) == Some(RESERVED_MODEL_FILE) {
            return false;
        }
        match path.extension() {
            Some(ext) => {
                ext != MODEL_EXTENSION && self.suffix.is_match(&ext.to_string_lossy())
            }
            None => false,
        }
    }
}

/// 解析为绝对路径，尚不存在的部分按原样拼接在已存在的祖先之后
fn resolve(path: &Path) -> PathBuf {
    if let Ok(path) = path.canonicalize() {
        return path;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolve(parent).join(name),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

impl GalleryStore for DirectoryStore {
    fn list_identities(&self) -> Result<Vec<String>> {
        let models = resolve(&self.models);
        let mut names = vec![];
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            // 模型目录默认位于图库根目录下，不能当作身份
            if models.starts_with(resolve(entry.path())) {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }

    fn list_samples(&self, identity: &str) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(identity);
        let mut samples = vec![];
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && self.is_sample(entry.path()) {
                samples.push(entry.into_path());
            }
        }
        debug!("{} 共有 {} 张样本图片", identity, samples.len());
        Ok(samples)
    }

    fn model_path(&self, identity: &str) -> PathBuf {
        self.models.join(format!("{}.{}", identity, MODEL_EXTENSION))
    }
}
