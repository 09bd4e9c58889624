//! 整臂标志位与只读投影
//!
//! `RobotState` / `RobotMeta` 每次访问时从关节状态和标志位重新组装，不做缓存。

use arm_joint::JointState;
use serde::Serialize;
use serde_json::{Map, Value};

/// 整臂标志位
///
/// 几个耦合的布尔量，而不是单一状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RobotFlags {
    pub stopped: bool,
    pub ready: bool,
    pub home: bool,
    pub homing: bool,
    pub moving: bool,
}

/// 完整状态：`{ id, joints: { <id>: <joint state> } }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotState {
    pub id: String,
    /// 按配置顺序
    pub joints: Vec<(String, JointState)>,
}

impl RobotState {
    pub fn joint(&self, id: &str) -> Option<&JointState> {
        self.joints.iter().find(|(j, _)| j == id).map(|(_, s)| s)
    }

    /// 序列化为 JSON 对象（关节按配置顺序）
    pub fn to_json(&self) -> Value {
        let joints: Map<String, Value> = self
            .joints
            .iter()
            .map(|(id, state)| {
                let value = serde_json::to_value(state).unwrap_or(Value::Null);
                (id.clone(), value)
            })
            .collect();
        serde_json::json!({ "id": self.id, "joints": joints })
    }
}

/// 元信息摘要：标志位 + 关节 id，不含实时位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotMeta {
    #[serde(flatten)]
    pub flags: RobotFlags,
    pub joints: Vec<String>,
}

impl RobotMeta {
    /// `{ stopped, ready, home, homing, moving, joints: { <id>: { id } } }`
    pub fn to_json(&self) -> Value {
        let joints: Map<String, Value> = self
            .joints
            .iter()
            .map(|id| (id.clone(), serde_json::json!({ "id": id })))
            .collect();
        serde_json::json!({
            "stopped": self.flags.stopped,
            "ready": self.flags.ready,
            "home": self.flags.home,
            "homing": self.flags.homing,
            "moving": self.flags.moving,
            "joints": joints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_json_keeps_joint_order() {
        let state = RobotState {
            id: "arm".into(),
            joints: vec![
                ("j1".into(), JointState::new("j1", 2)),
                ("j0".into(), JointState::new("j0", 1)),
            ],
        };
        let value = state.to_json();
        let keys: Vec<_> = value["joints"].as_object().unwrap().keys().cloned().collect();

        assert_eq!(value["id"], "arm");
        assert_eq!(keys, vec!["j1", "j0"]);
        assert_eq!(value["joints"]["j0"]["busAddress"], 1);
    }

    #[test]
    fn test_meta_json_shape() {
        let meta = RobotMeta {
            flags: RobotFlags {
                ready: true,
                ..RobotFlags::default()
            },
            joints: vec!["j0".into()],
        };
        assert_eq!(
            meta.to_json(),
            serde_json::json!({
                "stopped": false,
                "ready": true,
                "home": false,
                "homing": false,
                "moving": false,
                "joints": { "j0": { "id": "j0" } },
            })
        );
    }
}
