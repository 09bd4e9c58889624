//! 参数文档的持久化

use crate::document::ConfigDocument;
use crate::error::ConfigError;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 持久化能力
pub trait ConfigStore: Send + Sync {
    /// 加载文档；不存在时创建空文档
    fn load(&self) -> Result<ConfigDocument, ConfigError>;

    /// 同步写出文档，返回时数据已落盘
    fn save(&self, document: &ConfigDocument) -> Result<(), ConfigError>;
}

/// JSON 文件存储
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
        Ok(())
    }

    fn write(&self, contents: &str) -> Result<(), ConfigError> {
        self.ensure_parent()?;

        // 先写临时文件并 sync，再 rename，中途失败不会留下半截文件
        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| ConfigError::io(&tmp, e))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ConfigError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| ConfigError::io(&self.path, e))?;
        Ok(())
    }

    /// 写入过程中使用的临时文件
    pub fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<ConfigDocument, ConfigError> {
        if !self.path.exists() {
            info!("Config {} not found, creating empty document", self.path.display());
            let document = ConfigDocument::new();
            self.write(&document.to_json_pretty()?)?;
            return Ok(document);
        }

        let contents =
            fs::read_to_string(&self.path).map_err(|e| ConfigError::io(&self.path, e))?;
        if contents.trim().is_empty() {
            return Ok(ConfigDocument::new());
        }
        let document = ConfigDocument::from_json_str(&contents)?;
        debug!("Loaded config from {}", self.path.display());
        Ok(document)
    }

    fn save(&self, document: &ConfigDocument) -> Result<(), ConfigError> {
        self.write(&document.to_json_pretty()?)?;
        debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

/// 内存存储（测试 / 仿真）
///
/// 记录每次 `save()`，可注入写失败。
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<ConfigDocument>,
    saves: Mutex<Vec<ConfigDocument>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: ConfigDocument) -> Self {
        Self {
            document: Mutex::new(document),
            ..Self::default()
        }
    }

    /// `save()` 调用次数（不含失败的调用）
    pub fn save_count(&self) -> usize {
        self.saves.lock().len()
    }

    pub fn last_saved(&self) -> Option<ConfigDocument> {
        self.saves.lock().last().cloned()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<ConfigDocument, ConfigError> {
        Ok(self.document.lock().clone())
    }

    fn save(&self, document: &ConfigDocument) -> Result<(), ConfigError> {
        if *self.fail_saves.lock() {
            return Err(ConfigError::io(
                "<memory>",
                std::io::Error::other("injected save failure"),
            ));
        }
        *self.document.lock() = document.clone();
        self.saves.lock().push(document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_records_saves() {
        let store = MemoryStore::new();
        let mut doc = store.load().unwrap();
        doc.set("j0", "maxSpeed", json!(10)).unwrap();

        store.save(&doc).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap(), doc);
    }

    #[test]
    fn test_memory_store_failure_keeps_document() {
        let store = MemoryStore::new();
        store.set_fail_saves(true);

        let mut doc = ConfigDocument::new();
        doc.set_global("label", json!("x"));
        assert!(store.save(&doc).is_err());
        assert_eq!(store.save_count(), 0);
        assert!(store.load().unwrap().is_empty());
    }
}
