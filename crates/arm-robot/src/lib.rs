//! # Arm Robot
//!
//! 多关节机械臂的编排层：
//!
//! - **Cyclic Scheduler**（`scheduler`）：相互独立的周期动作，可注入时钟
//! - **Robot**（`robot`）：持有关节集合，维护整臂标志位
//!   （ready / home / homing / moving / stopped），把关节事件聚合成整臂状态，
//!   提供整臂扇出命令和单关节命令
//! - **配置应用**：`update_config()` 同时更新配置文档和关节参数
//! - **投影**（`state`）：`RobotState` / `RobotMeta`，每次访问重新组装
//! - **事件**（`events`）：`ready` / `state` / `meta` / `encoder` 的订阅接口
//! - **运行时**（`runtime`）：线程化的周期动作和关节事件泵
//!
//! ```
//! use arm_joint::{JointConfig, SimJointFactory};
//! use arm_robot::{RobotBuilder, RobotEvent};
//!
//! let mut builder = RobotBuilder::new("bench")
//!     .joint(JointConfig::new("j0", 1))
//!     .factory(SimJointFactory);
//! let events = builder.subscribe();
//! let robot = builder.build().unwrap();
//! assert_eq!(events.try_recv().unwrap(), RobotEvent::Ready);
//!
//! robot.robot_home();
//! robot.process_joint_events();
//! assert!(robot.flags().home);
//! ```

mod builder;
mod error;
pub mod events;
mod robot;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use builder::RobotBuilder;
pub use error::{RobotError, TickError};
pub use events::{RobotEvent, RobotListener};
pub use robot::Robot;
pub use runtime::{EventPump, RobotRuntime, ScheduledActions};
pub use scheduler::{ActionId, ActionStats, Clock, CyclicScheduler, ManualClock, MonotonicClock};
pub use state::{RobotFlags, RobotMeta, RobotState};
