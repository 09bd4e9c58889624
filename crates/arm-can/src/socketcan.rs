//! SocketCAN 通道（仅 Linux）
//!
//! 包装 `socketcan::CanSocket`，通过 `&self` 收发，
//! 允许接收线程和各关节的命令发送共享同一个 socket。

use crate::{BusChannel, BusError, BusFrame};
use parking_lot::Mutex;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Frame, Socket, StandardId};
use std::time::Duration;
use tracing::{trace, warn};

/// SO_RCVTIMEO 为 0 表示永久阻塞，必须钳位到一个极小的正值
const MIN_READ_TIMEOUT: Duration = Duration::from_micros(100);

/// SocketCAN 总线通道
pub struct SocketCanBus {
    interface: String,
    socket: CanSocket,
    /// 上一次设置的读取超时，避免每次接收都调用 setsockopt
    read_timeout: Mutex<Duration>,
}

impl SocketCanBus {
    /// 打开 SocketCAN 接口（如 "can0"）
    pub fn open(interface: impl Into<String>) -> Result<Self, BusError> {
        let interface = interface.into();
        let socket = CanSocket::open(&interface).map_err(|e| {
            BusError::Io(std::io::Error::other(format!(
                "Failed to open CAN interface '{}': {}",
                interface, e
            )))
        })?;

        let read_timeout = Duration::from_millis(2);
        socket.set_read_timeout(read_timeout)?;

        Ok(Self {
            interface,
            socket,
            read_timeout: Mutex::new(read_timeout),
        })
    }

    fn ensure_read_timeout(&self, timeout: Duration) -> Result<(), BusError> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        let mut current = self.read_timeout.lock();
        if *current != timeout {
            self.socket.set_read_timeout(timeout)?;
            *current = timeout;
        }
        Ok(())
    }
}

impl BusChannel for SocketCanBus {
    fn send(&self, frame: BusFrame) -> Result<(), BusError> {
        let can_frame = StandardId::new(frame.id)
            .and_then(|id| CanFrame::new(id, frame.data_slice()))
            .ok_or_else(|| {
                BusError::InvalidFrame(format!("cannot build standard frame 0x{:X}", frame.id))
            })?;

        self.socket.write_frame(&can_frame)?;
        trace!("Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<BusFrame, BusError> {
        self.ensure_read_timeout(timeout)?;

        loop {
            let can_frame = match self.socket.read_frame() {
                Ok(frame) => frame,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(BusError::Timeout);
                },
                Err(e) => return Err(BusError::Io(e)),
            };

            if let CanFrame::Error(_) = &can_frame {
                warn!("{}: CAN error frame received", self.interface);
                continue;
            }
            if can_frame.is_extended() {
                trace!("{}: ignoring extended frame", self.interface);
                continue;
            }

            let frame = BusFrame::new((can_frame.raw_id() & 0x7FF) as u16, can_frame.data());
            return Ok(frame);
        }
    }

    fn name(&self) -> &str {
        &self.interface
    }
}
