//! CANopen / CiA 402 帧编解码
//!
//! 关节驱动器使用 CANopen 协议，本模块只实现机械臂用到的子集：
//! - SDO 加速传输（expedited，≤ 4 字节）的下载 / 上传请求
//! - SDO 应答（上传数据、下载确认、中止）
//! - TPDO1 反馈：`[statusword: u16][position_actual: i32]`（驱动器需按此映射配置）
//!
//! ## 字节序
//!
//! CANopen 使用小端字节序（低位在前）。
//!
//! ## COB-ID
//!
//! | 功能 | COB-ID |
//! |---|---|
//! | TPDO1 | 0x180 + node |
//! | SDO 应答（server → client） | 0x580 + node |
//! | SDO 请求（client → server） | 0x600 + node |

use crate::error::ProtocolError;
use arm_can::BusFrame;
use bilge::prelude::*;

pub const COB_TPDO1: u16 = 0x180;
pub const COB_SDO_RESPONSE: u16 = 0x580;
pub const COB_SDO_REQUEST: u16 = 0x600;

const FUNCTION_MASK: u16 = 0x780;
const NODE_MASK: u16 = 0x7F;

// 对象字典索引（CiA 402）
pub const OD_CONTROLWORD: u16 = 0x6040;
pub const OD_STATUSWORD: u16 = 0x6041;
pub const OD_MODES_OF_OPERATION: u16 = 0x6060;
pub const OD_POSITION_ACTUAL: u16 = 0x6064;
pub const OD_TARGET_POSITION: u16 = 0x607A;
pub const OD_PROFILE_VELOCITY: u16 = 0x6081;
pub const OD_PROFILE_ACCELERATION: u16 = 0x6083;
pub const OD_HOMING_METHOD: u16 = 0x6098;

/// 控制字命令
pub mod controlword {
    pub const DISABLE_VOLTAGE: u16 = 0x0000;
    pub const SHUTDOWN: u16 = 0x0006;
    pub const SWITCH_ON: u16 = 0x0007;
    pub const ENABLE_OPERATION: u16 = 0x000F;
    /// Bit 4：新设定点（轮廓位置模式）/ 开始回零（回零模式）
    pub const NEW_SET_POINT: u16 = 0x001F;
    /// Bit 4 + Bit 5：立即切换到新设定点
    pub const SET_POINT_IMMEDIATE: u16 = 0x003F;
    pub const FAULT_RESET: u16 = 0x0080;
}

/// 回零方式（0x6098）
pub mod homing_method {
    /// 负限位开关
    pub const NEGATIVE_LIMIT_SWITCH: i8 = 17;
    /// 以当前位置为零点
    pub const CURRENT_POSITION: i8 = 35;
}

/// 运行模式（0x6060）
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum OperationMode {
    ProfilePosition = 1,
    Homing = 6,
}

/// SDO 服务端命令字（命令字节高 3 位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
enum ServerCommand {
    UploadResponse = 2,
    DownloadResponse = 3,
    Abort = 4,
}

/// 状态字位域（0x6041）
///
/// 位序为 LSB first，与 bilge 默认一致。
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Statusword {
    pub ready_to_switch_on: bool, // Bit 0
    pub switched_on: bool,        // Bit 1
    pub operation_enabled: bool,  // Bit 2
    pub fault: bool,              // Bit 3
    pub voltage_enabled: bool,    // Bit 4
    pub quick_stop: bool,         // Bit 5
    pub switch_on_disabled: bool, // Bit 6
    pub warning: bool,            // Bit 7
    pub manufacturer: bool,       // Bit 8
    pub remote: bool,             // Bit 9
    pub target_reached: bool,     // Bit 10
    pub internal_limit: bool,     // Bit 11
    pub homing_attained: bool,    // Bit 12（回零模式）
    pub homing_error: bool,       // Bit 13（回零模式）
    pub reserved: u2,             // Bit 14-15
}

/// SDO 加速传输的数据值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I32(i32),
    U32(u32),
}

impl SdoValue {
    fn size(&self) -> usize {
        match self {
            SdoValue::U8(_) | SdoValue::I8(_) => 1,
            SdoValue::U16(_) => 2,
            SdoValue::I32(_) | SdoValue::U32(_) => 4,
        }
    }

    fn to_le_bytes(self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        match self {
            SdoValue::U8(v) => bytes[0] = v,
            SdoValue::I8(v) => bytes[0] = v as u8,
            SdoValue::U16(v) => bytes[..2].copy_from_slice(&v.to_le_bytes()),
            SdoValue::I32(v) => bytes.copy_from_slice(&v.to_le_bytes()),
            SdoValue::U32(v) => bytes.copy_from_slice(&v.to_le_bytes()),
        }
        bytes
    }
}

/// 从驱动器收到的帧
#[derive(Debug, Clone, Copy)]
pub enum Inbound {
    /// TPDO1：状态字 + 实际位置（编码器计数）
    Feedback { statusword: Statusword, position: i32 },
    /// SDO 上传应答
    Upload { index: u16, subindex: u8, value: u32 },
    /// SDO 下载确认
    DownloadAck { index: u16, subindex: u8 },
    /// SDO 中止
    Abort { index: u16, subindex: u8, code: u32 },
}

/// 从 COB-ID 提取 node id
pub fn node_of(cob_id: u16) -> u8 {
    (cob_id & NODE_MASK) as u8
}

/// 构建 SDO 加速下载（写对象字典）
pub fn sdo_download(node: u8, index: u16, subindex: u8, value: SdoValue) -> BusFrame {
    // ccs=1, e=1, s=1, n = 4 - size
    let command = 0x23 | (((4 - value.size()) as u8) << 2);
    let [i_lo, i_hi] = index.to_le_bytes();
    let [b0, b1, b2, b3] = value.to_le_bytes();
    BusFrame::new(
        COB_SDO_REQUEST + node as u16,
        &[command, i_lo, i_hi, subindex, b0, b1, b2, b3],
    )
}

/// 构建 SDO 上传请求（读对象字典）
pub fn sdo_upload_request(node: u8, index: u16, subindex: u8) -> BusFrame {
    let [i_lo, i_hi] = index.to_le_bytes();
    BusFrame::new(
        COB_SDO_REQUEST + node as u16,
        &[0x40, i_lo, i_hi, subindex, 0, 0, 0, 0],
    )
}

/// 写控制字
pub fn controlword_frame(node: u8, word: u16) -> BusFrame {
    sdo_download(node, OD_CONTROLWORD, 0, SdoValue::U16(word))
}

/// 构建 SDO 上传应答（驱动器侧，用于仿真和测试）
pub fn sdo_upload_response(node: u8, index: u16, subindex: u8, value: SdoValue) -> BusFrame {
    let command = 0x43 | (((4 - value.size()) as u8) << 2);
    let [i_lo, i_hi] = index.to_le_bytes();
    let [b0, b1, b2, b3] = value.to_le_bytes();
    BusFrame::new(
        COB_SDO_RESPONSE + node as u16,
        &[command, i_lo, i_hi, subindex, b0, b1, b2, b3],
    )
}

/// 构建 TPDO1 反馈帧（驱动器侧，用于仿真和测试）
pub fn feedback_frame(node: u8, statusword: u16, position: i32) -> BusFrame {
    let [s0, s1] = statusword.to_le_bytes();
    let [p0, p1, p2, p3] = position.to_le_bytes();
    BusFrame::new(COB_TPDO1 + node as u16, &[s0, s1, p0, p1, p2, p3])
}

/// 解析驱动器发出的帧
///
/// 返回 (node id, 内容)。非 TPDO1 / SDO 应答的 COB-ID 返回 `InvalidCobId`。
pub fn decode(frame: &BusFrame) -> Result<(u8, Inbound), ProtocolError> {
    let node = node_of(frame.id);
    let data = frame.data_slice();

    match frame.id & FUNCTION_MASK {
        COB_TPDO1 => {
            if data.len() < 6 {
                return Err(ProtocolError::InvalidLength {
                    expected: 6,
                    actual: data.len(),
                });
            }
            let statusword = Statusword::from(u16::from_le_bytes([data[0], data[1]]));
            let position = i32::from_le_bytes([data[2], data[3], data[4], data[5]]);
            Ok((node, Inbound::Feedback { statusword, position }))
        },
        COB_SDO_RESPONSE => {
            if data.len() < 8 {
                return Err(ProtocolError::InvalidLength {
                    expected: 8,
                    actual: data.len(),
                });
            }
            let byte = data[0];
            let index = u16::from_le_bytes([data[1], data[2]]);
            let subindex = data[3];
            let payload = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

            let command = ServerCommand::try_from(byte >> 5)
                .map_err(|_| ProtocolError::UnknownCommand { byte })?;
            let inbound = match command {
                ServerCommand::UploadResponse => {
                    // 仅支持加速传输且指明长度（e=1, s=1）
                    if byte & 0x03 != 0x03 {
                        return Err(ProtocolError::UnknownCommand { byte });
                    }
                    let unused = ((byte >> 2) & 0x03) as u32;
                    let mask = u32::MAX >> (unused * 8);
                    Inbound::Upload {
                        index,
                        subindex,
                        value: payload & mask,
                    }
                },
                ServerCommand::DownloadResponse => Inbound::DownloadAck { index, subindex },
                ServerCommand::Abort => Inbound::Abort {
                    index,
                    subindex,
                    code: payload,
                },
            };
            Ok((node, inbound))
        },
        _ => Err(ProtocolError::InvalidCobId { id: frame.id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdo_download_command_bytes() {
        let frame = sdo_download(3, OD_CONTROLWORD, 0, SdoValue::U16(0x000F));
        assert_eq!(frame.id, 0x603);
        assert_eq!(frame.data, [0x2B, 0x40, 0x60, 0x00, 0x0F, 0x00, 0x00, 0x00]);

        let frame = sdo_download(1, OD_TARGET_POSITION, 0, SdoValue::I32(-2));
        assert_eq!(frame.data, [0x23, 0x7A, 0x60, 0x00, 0xFE, 0xFF, 0xFF, 0xFF]);

        let frame = sdo_download(1, OD_MODES_OF_OPERATION, 0, SdoValue::U8(6));
        assert_eq!(frame.data[0], 0x2F);
    }

    #[test]
    fn test_sdo_upload_request() {
        let frame = sdo_upload_request(5, OD_POSITION_ACTUAL, 0);
        assert_eq!(frame.id, 0x605);
        assert_eq!(frame.data, [0x40, 0x64, 0x60, 0x00, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_feedback() {
        // operation enabled + homing attained
        let frame = feedback_frame(2, 0x1027, -1234);
        let (node, inbound) = decode(&frame).unwrap();
        assert_eq!(node, 2);
        match inbound {
            Inbound::Feedback {
                statusword,
                position,
            } => {
                assert!(statusword.operation_enabled());
                assert!(statusword.homing_attained());
                assert!(!statusword.fault());
                assert_eq!(position, -1234);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_upload_masks_unused_bytes() {
        let mut frame = sdo_upload_response(1, OD_STATUSWORD, 0, SdoValue::U16(0x0237));
        // 未使用字节填充垃圾，解码时必须忽略
        frame.data[6] = 0xAB;
        frame.data[7] = 0xCD;
        let (_, inbound) = decode(&frame).unwrap();
        assert!(matches!(
            inbound,
            Inbound::Upload {
                index: OD_STATUSWORD,
                subindex: 0,
                value: 0x0237
            }
        ));
    }

    #[test]
    fn test_decode_abort_and_ack() {
        let frame = BusFrame::new(0x581, &[0x80, 0x7A, 0x60, 0x00, 0x11, 0x00, 0x09, 0x06]);
        let (_, inbound) = decode(&frame).unwrap();
        assert!(matches!(
            inbound,
            Inbound::Abort {
                index: OD_TARGET_POSITION,
                subindex: 0,
                code: 0x0609_0011
            }
        ));

        let frame = BusFrame::new(0x581, &[0x60, 0x40, 0x60, 0x00, 0, 0, 0, 0]);
        assert!(matches!(
            decode(&frame).unwrap().1,
            Inbound::DownloadAck { index: OD_CONTROLWORD, .. }
        ));
    }

    #[test]
    fn test_decode_rejects_foreign_frames() {
        assert!(matches!(
            decode(&BusFrame::new(0x701, &[0x05])),
            Err(ProtocolError::InvalidCobId { id: 0x701 })
        ));
        assert!(matches!(
            decode(&BusFrame::new(0x181, &[0x00, 0x00])),
            Err(ProtocolError::InvalidLength { expected: 6, actual: 2 })
        ));
        assert!(matches!(
            decode(&BusFrame::new(0x581, &[0xE0, 0, 0, 0, 0, 0, 0, 0])),
            Err(ProtocolError::UnknownCommand { byte: 0xE0 })
        ));
    }

    #[test]
    fn test_operation_mode_conversion() {
        assert_eq!(OperationMode::try_from(6u8).unwrap(), OperationMode::Homing);
        assert!(OperationMode::try_from(3u8).is_err());
        assert_eq!(u8::from(OperationMode::ProfilePosition), 1);
    }
}
