//! 关节状态快照
//!
//! 读多写少：控制循环、状态广播和 UI 频繁读取，
//! 写入只发生在命令发送和反馈解析时。
//! 读取使用 ArcSwap（无锁），写入经过一把写锁串行化，
//! 这样写方可以同时拿到"旧值 / 新值"用于边沿检测。

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// 最近一次参数查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterReading {
    pub index: u16,
    pub subindex: u8,
    pub value: u32,
}

/// 关节状态（对上层不透明，仅用于投影和广播）
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JointState {
    pub id: String,
    pub bus_address: u8,
    pub enabled: bool,
    pub homed: bool,
    pub homing: bool,
    pub error: bool,
    /// 当前位置（度）
    pub position: f64,
    /// 最近一次设定点（度）
    pub set_point: Option<f64>,
    /// 最近一次设定速度（度/秒）
    pub velocity: Option<f64>,
    /// 零点对应的编码器步数
    pub zero_step: i32,
    pub last_parameter: Option<ParameterReading>,
}

impl JointState {
    pub fn new(id: impl Into<String>, bus_address: u8) -> Self {
        Self {
            id: id.into(),
            bus_address,
            ..Default::default()
        }
    }
}

/// 可共享的关节状态
pub struct SharedJointState {
    inner: ArcSwap<JointState>,
    write_lock: Mutex<()>,
}

impl SharedJointState {
    pub fn new(initial: JointState) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
            write_lock: Mutex::new(()),
        }
    }

    /// 无锁读取当前快照
    pub fn load(&self) -> Arc<JointState> {
        self.inner.load_full()
    }

    /// 读-改-写，返回 (旧值, 新值)
    pub fn update<F>(&self, f: F) -> (Arc<JointState>, Arc<JointState>)
    where
        F: FnOnce(&mut JointState),
    {
        let _guard = self.write_lock.lock();
        let previous = self.inner.load_full();
        let mut next = (*previous).clone();
        f(&mut next);
        let next = Arc::new(next);
        self.inner.store(next.clone());
        (previous, next)
    }
}
