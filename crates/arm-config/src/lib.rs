//! # Arm Config
//!
//! 两类配置：
//!
//! - **机械臂描述**（`ArmConfig`，TOML）：构造时读取一次，决定关节集合、
//!   总线地址和调度周期。运行期间不可变。
//! - **参数文档**（`ConfigDocument`，JSON）：运行时可修改的关节参数和全局键，
//!   通过 `ConfigStore` 加载 / 持久化。
//!
//! ```json
//! {
//!   "j0": { "limitAdj": 2.5, "maxSpeed": 40 },
//!   "j1": { "invert": true },
//!   "label": "bench arm"
//! }
//! ```
//!
//! 顶层对象值按关节 id 解释，其他值为全局键。

mod arm;
mod document;
mod error;
mod store;

pub use arm::{ArmConfig, CyclePeriods};
pub use document::{ConfigDocument, ConfigPath, split_key};
pub use error::ConfigError;
pub use store::{ConfigStore, JsonFileStore, MemoryStore};
