//! 关节层错误类型定义

use arm_can::BusError;
use thiserror::Error;

/// 关节命令错误
#[derive(Error, Debug)]
pub enum JointError {
    /// 总线收发错误
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 参数校验失败
    #[error("Invalid parameter: {0}")]
    Param(#[from] ParamError),

    /// 命令参数无效（如 NaN 位置）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 关节构造失败
    #[error("Failed to construct joint '{joint}': {reason}")]
    Construction { joint: String, reason: String },
}

/// CANopen 帧解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid COB-ID: 0x{id:03X}")]
    InvalidCobId { id: u16 },

    #[error("Unknown SDO command specifier: 0x{byte:02X}")]
    UnknownCommand { byte: u8 },
}

/// 关节参数错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// 参数名不在 schema 中
    #[error("Unknown joint parameter '{name}'")]
    Unknown { name: String },

    /// 值类型不匹配
    #[error("Parameter '{name}' expects {expected}")]
    InvalidType { name: String, expected: &'static str },

    /// 值超出允许范围
    #[error("Parameter '{name}' out of range: {reason}")]
    OutOfRange { name: String, reason: String },
}
