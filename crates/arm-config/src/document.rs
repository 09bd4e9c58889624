//! 参数文档（内存镜像）

use crate::error::ConfigError;
use serde_json::{Map, Value};

/// 配置键的两种形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPath<'a> {
    /// `joint.param`
    Joint { joint: &'a str, param: &'a str },
    /// 不含分隔符的全局键
    Global(&'a str),
}

/// 按第一个 `.` 拆分配置键
///
/// ```
/// use arm_config::{ConfigPath, split_key};
///
/// assert_eq!(
///     split_key("j0.limitAdj").unwrap(),
///     ConfigPath::Joint { joint: "j0", param: "limitAdj" }
/// );
/// assert_eq!(split_key("label").unwrap(), ConfigPath::Global("label"));
/// assert!(split_key("j0.").is_err());
/// ```
pub fn split_key(key: &str) -> Result<ConfigPath<'_>, ConfigError> {
    match key.split_once('.') {
        Some((joint, param)) if !joint.is_empty() && !param.is_empty() => {
            Ok(ConfigPath::Joint { joint, param })
        },
        Some(_) => Err(ConfigError::InvalidKey(key.to_string())),
        None if key.is_empty() => Err(ConfigError::InvalidKey(key.to_string())),
        None => Ok(ConfigPath::Global(key)),
    }
}

/// 参数文档
///
/// 顶层为 JSON 对象；关节 id 对应的值为参数对象，其余为全局键。
/// 保持插入顺序（`serde_json/preserve_order`），持久化时不打乱用户文件。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    root: Map<String, Value>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 值构建，顶层必须是对象
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(ConfigError::NotAnObject("<root>".to_string())),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str(s)?)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// 读取关节参数
    pub fn get(&self, joint: &str, param: &str) -> Option<&Value> {
        self.joint_params(joint)?.get(param)
    }

    /// 读取全局键
    pub fn get_global(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// 关节的全部参数（关节条目不存在或不是对象时返回 `None`）
    pub fn joint_params(&self, joint: &str) -> Option<&Map<String, Value>> {
        self.root.get(joint)?.as_object()
    }

    /// 写关节参数，关节条目不存在时创建
    pub fn set(&mut self, joint: &str, param: &str, value: Value) -> Result<(), ConfigError> {
        let entry = self
            .root
            .entry(joint.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry.as_object_mut() {
            Some(params) => {
                params.insert(param.to_string(), value);
                Ok(())
            },
            None => Err(ConfigError::NotAnObject(joint.to_string())),
        }
    }

    /// 删除关节参数，返回旧值
    pub fn remove(&mut self, joint: &str, param: &str) -> Option<Value> {
        self.root.get_mut(joint)?.as_object_mut()?.shift_remove(param)
    }

    /// 写全局键
    pub fn set_global(&mut self, key: &str, value: Value) {
        self.root.insert(key.to_string(), value);
    }

    /// 按 `joint.param` / `key` 写入
    pub fn update_path(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        match split_key(key)? {
            ConfigPath::Joint { joint, param } => self.set(joint, param, value),
            ConfigPath::Global(key) => {
                self.set_global(key, value);
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_key_forms() {
        assert_eq!(
            split_key("j0.limitAdj").unwrap(),
            ConfigPath::Joint {
                joint: "j0",
                param: "limitAdj"
            }
        );
        // 只按第一个分隔符拆分
        assert_eq!(
            split_key("j0.a.b").unwrap(),
            ConfigPath::Joint {
                joint: "j0",
                param: "a.b"
            }
        );
        assert_eq!(split_key("label").unwrap(), ConfigPath::Global("label"));

        for bad in ["", ".x", "j0.", "."] {
            assert!(matches!(split_key(bad), Err(ConfigError::InvalidKey(_))), "{bad}");
        }
    }

    #[test]
    fn test_set_creates_joint_entry() {
        let mut doc = ConfigDocument::new();
        doc.set("j0", "limitAdj", json!(5)).unwrap();

        assert_eq!(doc.get("j0", "limitAdj"), Some(&json!(5)));
        assert_eq!(doc.to_value(), json!({ "j0": { "limitAdj": 5 } }));
    }

    #[test]
    fn test_set_rejects_non_object_joint_entry() {
        let mut doc = ConfigDocument::from_value(json!({ "j0": 3 })).unwrap();
        assert!(matches!(
            doc.set("j0", "limitAdj", json!(1)),
            Err(ConfigError::NotAnObject(_))
        ));
        assert_eq!(doc.get_global("j0"), Some(&json!(3)));
    }

    #[test]
    fn test_update_path_routes_global_and_joint() {
        let mut doc = ConfigDocument::new();
        doc.update_path("label", json!("bench")).unwrap();
        doc.update_path("j1.invert", json!(true)).unwrap();

        assert_eq!(doc.get_global("label"), Some(&json!("bench")));
        assert_eq!(doc.get("j1", "invert"), Some(&json!(true)));
        assert!(doc.joint_params("label").is_none());
    }

    #[test]
    fn test_preserves_insertion_order() {
        let doc = ConfigDocument::from_json_str(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let keys: Vec<_> = doc.to_value().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(ConfigDocument::from_value(json!([1, 2])).is_err());
    }
}
