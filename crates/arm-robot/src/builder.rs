//! Builder 模式实现
//!
//! 提供链式构造 `Robot` 的便捷方式。
//!
//! ```
//! use arm_joint::{JointConfig, SimJointFactory};
//! use arm_robot::RobotBuilder;
//!
//! let robot = RobotBuilder::new("bench")
//!     .joint(JointConfig::new("j0", 1))
//!     .joint(JointConfig::new("j1", 2))
//!     .factory(SimJointFactory)
//!     .build()
//!     .unwrap();
//!
//! assert!(robot.flags().ready);
//! assert_eq!(robot.joint_ids().collect::<Vec<_>>(), ["j0", "j1"]);
//! ```

use crate::error::RobotError;
use crate::events::{DEFAULT_SUBSCRIBER_CAPACITY, EventHub, RobotEvent, RobotListener};
use crate::robot::Robot;
use arm_config::{ArmConfig, ConfigDocument, ConfigStore, MemoryStore};
use arm_joint::{EventSink, JointConfig, JointController, JointFactory, JointParam};
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Robot Builder（链式构造）
pub struct RobotBuilder {
    id: String,
    joints: Vec<JointConfig>,
    factory: Option<Arc<dyn JointFactory>>,
    store: Option<Arc<dyn ConfigStore>>,
    hub: EventHub,
}

impl RobotBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            joints: Vec::new(),
            factory: None,
            store: None,
            hub: EventHub::default(),
        }
    }

    /// 从机械臂描述创建（id + 关节列表）
    pub fn from_arm_config(config: &ArmConfig) -> Self {
        Self::new(config.id.clone()).joints(config.joints.iter().cloned())
    }

    /// 追加一个关节（顺序即配置顺序）
    pub fn joint(mut self, config: JointConfig) -> Self {
        self.joints.push(config);
        self
    }

    pub fn joints(mut self, configs: impl IntoIterator<Item = JointConfig>) -> Self {
        self.joints.extend(configs);
        self
    }

    /// 关节工厂（必需）
    pub fn factory(mut self, factory: impl JointFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn shared_factory(mut self, factory: Arc<dyn JointFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 参数存储（可选，默认 `MemoryStore`）
    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 在构造前注册回调，能收到 `ready`
    pub fn listener(self, listener: Arc<dyn RobotListener>) -> Self {
        self.hub.add_listener(listener);
        self
    }

    /// 在构造前订阅，能收到 `ready`
    pub fn subscribe(&mut self) -> Receiver<RobotEvent> {
        self.hub.subscribe(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// 构造机械臂
    ///
    /// 1. 校验关节 id 唯一、不含 `.`
    /// 2. 加载参数文档，文档中的关节参数覆盖描述文件中的初值
    /// 3. 按配置顺序创建关节
    /// 4. 标记 ready 并发出 `ready`
    pub fn build(self) -> Result<Arc<Robot>, RobotError> {
        let factory = self
            .factory
            .ok_or_else(|| RobotError::Build("no joint factory configured".to_string()))?;
        validate_joint_ids(&self.joints)?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn ConfigStore>);
        let document = store.load()?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut joints: Vec<Arc<dyn JointController>> = Vec::with_capacity(self.joints.len());
        for config in &self.joints {
            let seeded = seed_params(config, &document);
            let joint = factory
                .create(&seeded, EventSink::new(config.id.clone(), tx.clone()))
                .map_err(|e| RobotError::Build(format!("joint '{}': {}", config.id, e)))?;
            debug!("Robot {}: joint {} created", self.id, config.id);
            joints.push(joint);
        }

        let robot = Arc::new(Robot::new(self.id, joints, document, store, rx, self.hub));
        robot.mark_ready();
        Ok(robot)
    }
}

fn validate_joint_ids(joints: &[JointConfig]) -> Result<(), RobotError> {
    let mut seen = HashSet::new();
    for joint in joints {
        if joint.id.is_empty() || joint.id.contains('.') {
            return Err(RobotError::Build(format!(
                "invalid joint id '{}'",
                joint.id
            )));
        }
        if !seen.insert(joint.id.as_str()) {
            return Err(RobotError::Build(format!("duplicate joint id '{}'", joint.id)));
        }
    }
    Ok(())
}

/// 用文档中的值覆盖关节参数初值；无法解析或越界的值跳过并记录
fn seed_params(config: &JointConfig, document: &ConfigDocument) -> JointConfig {
    let mut seeded = config.clone();
    let Some(stored) = document.joint_params(&config.id) else {
        return seeded;
    };

    for (name, value) in stored {
        let applied = JointParam::parse(name, value).and_then(|p| seeded.params.apply(p));
        if let Err(e) = applied {
            warn!("Joint {}: ignoring stored parameter '{}': {}", config.id, name, e);
        }
    }
    seeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seed_params_overrides_and_skips_invalid() {
        let mut doc = ConfigDocument::new();
        doc.set("j0", "maxSpeed", json!(12.5)).unwrap();
        doc.set("j0", "bogus", json!(1)).unwrap();
        doc.set("j0", "acceleration", json!(-1)).unwrap();

        let seeded = seed_params(&JointConfig::new("j0", 1), &doc);
        assert_eq!(seeded.params.max_speed, 12.5);
        assert_eq!(seeded.params.acceleration, 60.0);
    }

    #[test]
    fn test_validate_joint_ids() {
        assert!(validate_joint_ids(&[JointConfig::new("j0", 1), JointConfig::new("j1", 2)]).is_ok());
        assert!(validate_joint_ids(&[JointConfig::new("j0", 1), JointConfig::new("j0", 2)]).is_err());
        assert!(validate_joint_ids(&[JointConfig::new("a.b", 1)]).is_err());
    }

    #[test]
    fn test_build_requires_factory() {
        let err = RobotBuilder::new("arm").build().unwrap_err();
        assert!(matches!(err, RobotError::Build(_)));
        assert!(!err.is_recoverable());
    }
}
