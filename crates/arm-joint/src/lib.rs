//! 关节控制器层
//!
//! 本模块定义单个关节（电机）的能力接口，以及基于共享总线的实现：
//! - `JointController` trait：使能/去使能、回零、置零、复位、校准、设定位置、查询
//! - 关节事件（homing / home / enabled / disabled / reset），经 channel 投递给上层
//! - 关节状态快照（ArcSwap 无锁读取）
//! - 枚举化的参数 schema（`JointParam`），拒绝未知参数名
//! - `BusJoint`：CiA 402 驱动器（CANopen SDO + TPDO1）
//! - `SimJoint`：进程内仿真关节，命令立即完成
//!
//! 上层（`arm-robot`）只依赖 `JointController` 和 `JointFactory`，
//! 不关心命令如何编码成总线帧。

mod bus_joint;
mod config;
mod controller;
mod error;
pub mod event;
pub mod params;
pub mod protocol;
pub mod router;
pub mod sim;
pub mod state;

pub use bus_joint::{BusJoint, BusJointFactory};
pub use config::JointConfig;
pub use controller::{JointController, JointFactory};
pub use error::{JointError, ParamError, ProtocolError};
pub use event::{EventSink, JointEvent, JointEventKind};
pub use params::{JointParam, JointParams};
pub use router::{FrameRouter, RxConfig, RxThread, rx_loop};
pub use sim::{SimJoint, SimJointFactory};
pub use state::{JointState, ParameterReading, SharedJointState};

/// 关节标识（如 `j0`），在一台机械臂内唯一
pub type JointId = String;
