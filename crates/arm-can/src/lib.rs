//! # Arm CAN Channel Layer
//!
//! 共享总线抽象：所有关节控制器通过同一个 `BusChannel` 收发帧。
//!
//! ## 模块
//!
//! - `loopback`: 内存回环通道（测试 / 仿真用，支持故障注入）
//! - `socketcan`: Linux SocketCAN 通道
//!
//! 帧编解码（CANopen SDO、PDO）不在本层处理，由 `arm-joint` 负责。

use std::time::Duration;
use thiserror::Error;

pub mod loopback;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use loopback::LoopbackBus;

#[cfg(target_os = "linux")]
pub use self::socketcan::SocketCanBus;

/// CAN 2.0 标准帧
///
/// 与具体后端无关的帧类型，关节层通过它构建 / 解析命令。
///
/// - **Copy trait**：零成本复制，适合 20Hz~1kHz 的周期发送
/// - **固定 8 字节**：避免堆分配
/// - **时间戳**：`timestamp_us` 为 0 表示不可用
///
/// ```rust
/// use arm_can::BusFrame;
///
/// let frame = BusFrame::new(0x601, &[0x2B, 0x40, 0x60, 0x00, 0x0F, 0x00]);
/// assert_eq!(frame.id(), 0x601);
/// assert_eq!(frame.data_slice().len(), 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusFrame {
    /// CAN ID（11-bit 标准帧）
    pub id: u16,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl BusFrame {
    /// 创建标准帧，超过 8 字节的数据会被截断
    pub fn new(id: u16, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u16 {
        self.id
    }

    /// 附加时间戳
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }
}

/// 通道层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Bus off")]
    BusOff,
    #[error("Channel closed")]
    Closed,
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl BusError {
    /// 是否为致命错误（接收循环应退出）
    pub fn is_fatal(&self) -> bool {
        matches!(self, BusError::Closed | BusError::BusOff)
    }
}

/// 共享总线通道
///
/// 与 `CanAdapter` 不同，通道通过 `&self` 收发，
/// 同一个 `Arc<dyn BusChannel>` 由所有关节和接收线程共享。
/// 实现必须自行保证内部同步。
pub trait BusChannel: Send + Sync {
    /// 发送一帧
    fn send(&self, frame: BusFrame) -> Result<(), BusError>;

    /// 接收一帧，超时返回 `BusError::Timeout`
    fn receive_timeout(&self, timeout: Duration) -> Result<BusFrame, BusError>;

    /// 非阻塞接收
    fn try_receive(&self) -> Result<Option<BusFrame>, BusError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(BusError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 通道名称（用于日志）
    fn name(&self) -> &str {
        "bus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_truncates_long_payload() {
        let frame = BusFrame::new(0x123, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_frame_pads_short_payload() {
        let frame = BusFrame::new(0x181, &[0xAA, 0xBB]);
        assert_eq!(frame.len, 2);
        assert_eq!(frame.data, [0xAA, 0xBB, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.timestamp_us, 0);
    }

    #[test]
    fn test_bus_error_fatal_classification() {
        assert!(BusError::Closed.is_fatal());
        assert!(BusError::BusOff.is_fatal());
        assert!(!BusError::Timeout.is_fatal());
        assert_eq!(format!("{}", BusError::Timeout), "Read timeout");
    }
}
