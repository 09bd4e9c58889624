//! 关节构造配置

use crate::params::JointParams;
use serde::{Deserialize, Serialize};

fn default_counts_per_degree() -> f64 {
    // 17-bit 编码器 / 360°
    131_072.0 / 360.0
}

/// 单个关节的构造参数
///
/// 通常来自机械臂描述文件（TOML）的 `[[joints]]` 表：
///
/// ```toml
/// [[joints]]
/// id = "j0"
/// bus_address = 1
///
/// [joints.params]
/// limitAdj = 2.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// 关节标识
    pub id: String,
    /// 总线地址（CANopen node id，1-127）
    pub bus_address: u8,
    /// 每度对应的编码器计数
    #[serde(default = "default_counts_per_degree")]
    pub counts_per_degree: f64,
    /// 参数初值
    #[serde(default)]
    pub params: JointParams,
}

impl JointConfig {
    pub fn new(id: impl Into<String>, bus_address: u8) -> Self {
        Self {
            id: id.into(),
            bus_address,
            counts_per_degree: default_counts_per_degree(),
            params: JointParams::default(),
        }
    }
}
