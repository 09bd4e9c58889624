//! 配置错误类型

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读写失败
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 解析 / 序列化失败
    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML 解析失败
    #[error("Invalid arm description: {0}")]
    Toml(#[from] toml::de::Error),

    /// 配置键格式错误（如 `.param`、`j0.`）
    #[error("Invalid config key '{0}'")]
    InvalidKey(String),

    /// 文档结构错误
    #[error("Expected a JSON object at '{0}'")]
    NotAnObject(String),

    /// 机械臂描述校验失败
    #[error("Invalid arm description: {0}")]
    Validation(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidKey("j0.".to_string());
        assert_eq!(format!("{}", err), "Invalid config key 'j0.'");

        let err = ConfigError::io(
            "/tmp/arm.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(format!("{}", err).contains("/tmp/arm.json"));
    }
}
