//! 机械臂层错误类型
//!
//! 错误分两类：
//! - **调用方错误**（未知关节、无效配置键 / 值）：直接返回给调用方，状态不变
//! - **关节命令错误**：整臂扇出时按关节隔离并记录日志，不返回；
//!   单关节命令时包装为 `JointCommand` 返回

use arm_config::ConfigError;
use arm_joint::JointError;
use thiserror::Error;

/// 机械臂错误
#[derive(Error, Debug)]
pub enum RobotError {
    /// 命令指向不存在的关节
    #[error("Unknown joint '{0}'")]
    UnknownJoint(String),

    /// 配置值无效（null、类型不符、越界）
    #[error("Invalid value for config key '{key}': {reason}")]
    InvalidConfigValue { key: String, reason: String },

    /// 配置键无法解析到已知关节 / 参数
    #[error("Invalid config key '{key}': {reason}")]
    ConfigKey { key: String, reason: String },

    /// 单关节命令失败
    #[error("Joint '{joint}' command failed: {source}")]
    JointCommand {
        joint: String,
        #[source]
        source: JointError,
    },

    /// 参数文档持久化失败
    #[error("Config store error: {0}")]
    Store(#[from] ConfigError),

    /// 调度器注册参数无效
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// 构造失败
    #[error("Failed to build robot: {0}")]
    Build(String),

    /// 后台线程创建失败
    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl RobotError {
    /// 是否可恢复（调用方修正输入或重试即可）
    ///
    /// 构造和线程创建失败意味着机械臂没有运行起来，不可恢复。
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RobotError::Build(_) | RobotError::Spawn { .. })
    }

    pub(crate) fn joint(joint: &str, source: JointError) -> Self {
        RobotError::JointCommand {
            joint: joint.to_string(),
            source,
        }
    }
}

/// 周期回调错误
///
/// 由调度器捕获并记录，本周期视为跳过，调度继续。
#[derive(Error, Debug)]
pub enum TickError {
    #[error(transparent)]
    Robot(#[from] RobotError),

    #[error(transparent)]
    Joint(#[from] JointError),

    /// 回调 panic
    #[error("tick panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}
