//! 关节控制器能力接口

use crate::config::JointConfig;
use crate::error::JointError;
use crate::event::EventSink;
use crate::params::{JointParam, JointParams};
use crate::state::JointState;
use std::sync::Arc;

/// 单个关节的能力接口
///
/// 所有方法通过 `&self` 调用，实现负责内部同步。
/// 命令可能执行阻塞的总线 I/O，调用方不得在持有共享锁时调用。
///
/// 状态变化（使能、回零完成等）不在返回值中体现，
/// 而是通过构造时传入的 `EventSink` 异步通知。
pub trait JointController: Send + Sync {
    /// 关节标识
    fn id(&self) -> &str;

    /// 总线地址
    fn bus_address(&self) -> u8;

    /// 把挂起的设定点写到总线（周期调度调用）
    fn write_set_point(&self) -> Result<(), JointError>;

    /// 锁存新的设定点（度 / 度每秒），在下一个调度周期发出
    fn set_position(&self, position: f64, velocity: Option<f64>) -> Result<(), JointError>;

    /// 开始回零
    fn go_home(&self) -> Result<(), JointError>;

    /// 故障复位
    fn reset(&self) -> Result<(), JointError>;

    fn enable(&self) -> Result<(), JointError>;

    fn disable(&self) -> Result<(), JointError>;

    /// 运动到零点（居中）
    fn zero(&self) -> Result<(), JointError>;

    /// 以当前位置作为参考点
    fn calibrate(&self) -> Result<(), JointError>;

    /// 请求刷新当前位置
    fn query_position(&self) -> Result<(), JointError>;

    /// 请求读取对象字典条目
    fn query_parameter(&self, index: u16, subindex: u8) -> Result<(), JointError>;

    /// 根据 `limitAdj` 重新计算零点步数
    fn update_zero_step(&self) -> Result<(), JointError>;

    /// 更新运行参数（纯内存操作，不做总线 I/O）
    ///
    /// 校验失败时参数保持不变。
    fn set_param(&self, param: JointParam) -> Result<(), JointError>;

    /// 当前参数
    fn params(&self) -> JointParams;

    /// 当前状态快照
    fn state(&self) -> JointState;
}

/// 关节工厂
///
/// 机械臂按配置顺序为每个关节调用一次。
pub trait JointFactory: Send + Sync {
    fn create(
        &self,
        config: &JointConfig,
        events: EventSink,
    ) -> Result<Arc<dyn JointController>, JointError>;
}

impl<F> JointFactory for F
where
    F: Fn(&JointConfig, EventSink) -> Result<Arc<dyn JointController>, JointError> + Send + Sync,
{
    fn create(
        &self,
        config: &JointConfig,
        events: EventSink,
    ) -> Result<Arc<dyn JointController>, JointError> {
        self(config, events)
    }
}
