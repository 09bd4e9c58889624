//! 整臂状态机
//!
//! # 并发模型
//!
//! - 关节集合（`joints` + `index`）构造后不可变，无需加锁
//! - 标志位和配置文档由**同一把** `Mutex` 保护；命令与其标志更新不会被拆开
//! - 关节命令可能阻塞在总线 I/O 上，调用时**不持有**这把锁：
//!   先改标志、释放锁，再扇出命令；结果通过关节事件异步回到 `process_joint_events()`
//! - 回零完成检查在锁内读取所有关节的 `homed`，得到一致快照
//! - `robot_home()` 在同一把锁内记录本轮待报告的关节；
//!   只有全部报告 `Home` 后才置位 `home`，上一轮残留的 `homed` 不计入
//!
//! # 错误传播
//!
//! 整臂命令按关节隔离失败：记录 `warn!` 后继续下一个关节，不返回给调用方。
//! 单关节命令的失败以 `RobotError::JointCommand` 返回。

use crate::error::RobotError;
use crate::events::{DEFAULT_SUBSCRIBER_CAPACITY, EventHub, RobotEvent, RobotListener};
use crate::state::{RobotFlags, RobotMeta, RobotState};
use arm_config::{ConfigDocument, ConfigPath, ConfigStore, split_key};
use arm_joint::{JointController, JointError, JointEvent, JointEventKind, JointParam, ParamError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 受同一把锁保护的可变部分
struct Inner {
    flags: RobotFlags,
    config: ConfigDocument,
    /// 本轮回零尚未报告 `Home` 的关节
    awaiting_home: HashSet<String>,
}

/// 机械臂
pub struct Robot {
    id: String,
    joints: Vec<Arc<dyn JointController>>,
    index: HashMap<String, usize>,
    inner: Mutex<Inner>,
    /// 串行化持久化，保证后写出的快照不旧于先写出的
    persist_lock: Mutex<()>,
    store: Arc<dyn ConfigStore>,
    joint_events: Receiver<JointEvent>,
    hub: EventHub,
}

impl Robot {
    pub(crate) fn new(
        id: String,
        joints: Vec<Arc<dyn JointController>>,
        config: ConfigDocument,
        store: Arc<dyn ConfigStore>,
        joint_events: Receiver<JointEvent>,
        hub: EventHub,
    ) -> Self {
        let index = joints
            .iter()
            .enumerate()
            .map(|(i, j)| (j.id().to_string(), i))
            .collect();

        Self {
            id,
            joints,
            index,
            inner: Mutex::new(Inner {
                flags: RobotFlags::default(),
                config,
                awaiting_home: HashSet::new(),
            }),
            persist_lock: Mutex::new(()),
            store,
            joint_events,
            hub,
        }
    }

    /// 构造收尾：标记 ready 并通知
    pub(crate) fn mark_ready(&self) {
        self.inner.lock().flags.ready = true;
        info!("Robot {}: ready with {} joint(s)", self.id, self.joints.len());
        self.hub.publish(RobotEvent::Ready);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 关节 id（配置顺序）
    pub fn joint_ids(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.id())
    }

    pub fn joint(&self, id: &str) -> Result<&Arc<dyn JointController>, RobotError> {
        self.index
            .get(id)
            .map(|&i| &self.joints[i])
            .ok_or_else(|| RobotError::UnknownJoint(id.to_string()))
    }

    pub fn flags(&self) -> RobotFlags {
        self.inner.lock().flags
    }

    /// 配置文档快照
    pub fn config(&self) -> ConfigDocument {
        self.inner.lock().config.clone()
    }

    // ============================================================
    // 订阅
    // ============================================================

    pub fn subscribe(&self) -> Receiver<RobotEvent> {
        self.hub.subscribe(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<RobotEvent> {
        self.hub.subscribe(capacity)
    }

    pub fn add_listener(&self, listener: Arc<dyn RobotListener>) {
        self.hub.add_listener(listener);
    }

    // ============================================================
    // 投影
    // ============================================================

    /// 完整状态（每次访问重新组装）
    pub fn state(&self) -> RobotState {
        RobotState {
            id: self.id.clone(),
            joints: self
                .joints
                .iter()
                .map(|j| (j.id().to_string(), j.state()))
                .collect(),
        }
    }

    pub fn meta(&self) -> RobotMeta {
        let flags = self.flags();
        self.meta_with(flags)
    }

    fn meta_with(&self, flags: RobotFlags) -> RobotMeta {
        RobotMeta {
            flags,
            joints: self.joint_ids().map(str::to_string).collect(),
        }
    }

    pub fn broadcast_state(&self) {
        if self.hub.has_subscribers() {
            self.hub.publish(RobotEvent::State(self.state()));
        }
    }

    pub fn broadcast_meta(&self) {
        self.hub.publish(RobotEvent::Meta(self.meta()));
    }

    /// 编码器数据可读信号
    pub fn signal_encoder(&self) {
        self.hub.publish(RobotEvent::Encoder);
    }

    // ============================================================
    // 整臂命令
    // ============================================================

    /// 对每个关节执行命令，失败只记录；返回失败的关节数
    fn fan_out<F>(&self, command: &str, f: F) -> usize
    where
        F: Fn(&dyn JointController) -> Result<(), JointError>,
    {
        let mut failures = 0;
        for joint in &self.joints {
            if let Err(e) = f(joint.as_ref()) {
                warn!(
                    "Robot {}: {} failed on joint {}: {}",
                    self.id,
                    command,
                    joint.id(),
                    e
                );
                failures += 1;
            }
        }
        failures
    }

    /// 所有关节回零
    ///
    /// 命令下发失败的关节仍在等待集合中，本轮不会完成，需要再次调用。
    pub fn robot_home(&self) -> usize {
        {
            let mut inner = self.inner.lock();
            inner.flags.homing = true;
            inner.flags.home = false;
            inner.awaiting_home = self.joint_ids().map(str::to_string).collect();
        }
        info!("Robot {}: homing started", self.id);
        self.fan_out("home", |j| j.go_home())
    }

    /// 停止：抑制设定点下发并去使能所有关节
    ///
    /// 已发出的关节命令不取消。
    pub fn robot_stop(&self) -> usize {
        {
            let mut inner = self.inner.lock();
            inner.flags.stopped = true;
            inner.flags.moving = false;
        }
        info!("Robot {}: stopped", self.id);
        self.fan_out("disable", |j| j.disable())
    }

    /// 所有关节运动到零点
    pub fn robot_center(&self) -> usize {
        self.inner.lock().flags.moving = true;
        info!("Robot {}: centering", self.id);
        self.fan_out("zero", |j| j.zero())
    }

    /// 解除停止并复位所有关节
    pub fn robot_reset(&self) -> usize {
        self.inner.lock().flags.stopped = false;
        info!("Robot {}: reset", self.id);
        self.fan_out("reset", |j| j.reset())
    }

    /// 解除停止并使能所有关节
    pub fn robot_enable(&self) -> usize {
        self.inner.lock().flags.stopped = false;
        info!("Robot {}: enabled", self.id);
        self.fan_out("enable", |j| j.enable())
    }

    /// 下发所有关节的设定点（周期调度调用）
    ///
    /// `stopped` 时不调用任何关节。返回失败的关节数。
    pub fn write_joint_set_points(&self) -> usize {
        if self.inner.lock().flags.stopped {
            return 0;
        }
        self.fan_out("write set-point", |j| j.write_set_point())
    }

    // ============================================================
    // 单关节命令
    // ============================================================

    fn with_joint<F>(&self, id: &str, f: F) -> Result<(), RobotError>
    where
        F: FnOnce(&dyn JointController) -> Result<(), JointError>,
    {
        let joint = self.joint(id)?;
        f(joint.as_ref()).map_err(|e| RobotError::joint(id, e))
    }

    pub fn motor_set_position(
        &self,
        id: &str,
        position: f64,
        velocity: Option<f64>,
    ) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.set_position(position, velocity))
    }

    pub fn motor_home(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.go_home())
    }

    pub fn motor_reset_errors(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.reset())
    }

    pub fn motor_enable(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.enable())
    }

    pub fn motor_disable(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.disable())
    }

    pub fn motor_zero(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.zero())
    }

    pub fn motor_calibrate(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.calibrate())
    }

    pub fn query_motor_position(&self, id: &str) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.query_position())
    }

    pub fn query_motor_parameter(
        &self,
        id: &str,
        index: u16,
        subindex: u8,
    ) -> Result<(), RobotError> {
        self.with_joint(id, |j| j.query_parameter(index, subindex))
    }

    // ============================================================
    // 关节事件
    // ============================================================

    /// 处理所有已到达的关节事件（非阻塞）；返回处理数量
    pub fn process_joint_events(&self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.joint_events.try_recv() {
            self.handle_joint_event(&event);
            handled += 1;
        }
        handled
    }

    /// 最多等待 `timeout` 直到有事件，然后处理所有已到达的事件
    pub fn wait_joint_events(&self, timeout: Duration) -> usize {
        match self.joint_events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_joint_event(&event);
                1 + self.process_joint_events()
            },
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn all_homed(&self) -> bool {
        self.joints.iter().all(|j| j.state().homed)
    }

    /// 重新计算整臂标志，随后广播 state + meta
    ///
    /// 回零完成只在 `Home` 事件上检查，可重复求值：
    /// 本轮每个关节都报告过 `Home` 且全部 `homed` 时才置位，
    /// 重复的 `Home` 不会让 `home` 再次翻转。
    fn handle_joint_event(&self, event: &JointEvent) {
        debug!("Robot {}: joint {} {:?}", self.id, event.joint, event.kind);

        let flags = {
            let mut inner = self.inner.lock();
            let all_homed = self.all_homed();
            if event.kind == JointEventKind::Home {
                inner.awaiting_home.remove(&event.joint);
            }
            let reported = inner.awaiting_home.is_empty();
            let flags = &mut inner.flags;

            if flags.home && !all_homed {
                flags.home = false;
                info!("Robot {}: home lost (joint {} not homed)", self.id, event.joint);
            }
            if event.kind == JointEventKind::Home && flags.homing && reported && all_homed {
                flags.homing = false;
                flags.home = true;
                info!("Robot {}: home reached", self.id);
            }
            *flags
        };

        self.hub.publish(RobotEvent::State(self.state()));
        self.hub.publish(RobotEvent::Meta(self.meta_with(flags)));
    }

    // ============================================================
    // 配置
    // ============================================================

    /// 更新配置
    ///
    /// - `joint.param`：配置文档与关节参数同时更新，任一失败则都不变；
    ///   `limitAdj` 额外触发关节零点重算
    /// - 无分隔符：全局键，无关节副作用
    /// - `persist`：返回前同步写入存储
    ///
    /// 值为 null 时直接拒绝，不修改、不广播；其余情况最后都广播 meta。
    pub fn update_config(&self, key: &str, value: Value, persist: bool) -> Result<(), RobotError> {
        if value.is_null() {
            return Err(RobotError::InvalidConfigValue {
                key: key.to_string(),
                reason: "value must not be null".to_string(),
            });
        }
        let path = split_key(key).map_err(|e| RobotError::ConfigKey {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let zero_step_joint = match path {
            ConfigPath::Joint { joint, param } => self.apply_joint_param(key, joint, param, value)?,
            ConfigPath::Global(global) if self.index.contains_key(global) => {
                return Err(RobotError::ConfigKey {
                    key: key.to_string(),
                    reason: "global key would replace a joint entry".to_string(),
                });
            },
            ConfigPath::Global(global) => {
                self.inner.lock().config.set_global(global, value);
                None
            },
        };
        debug!("Robot {}: config '{}' updated", self.id, key);

        // 锁外执行可能阻塞的副作用
        let mut result = Ok(());
        if let Some(joint) = zero_step_joint
            && let Err(e) = joint.update_zero_step()
        {
            warn!("Robot {}: zero step update failed on {}: {}", self.id, joint.id(), e);
            result = Err(RobotError::joint(joint.id(), e));
        }
        if persist && let Err(e) = self.persist() {
            warn!("Robot {}: failed to persist config: {}", self.id, e);
            if result.is_ok() {
                result = Err(e);
            }
        }

        self.broadcast_meta();
        result
    }

    /// 在锁内同时写配置文档和关节参数；返回需要重算零点的关节
    fn apply_joint_param(
        &self,
        key: &str,
        joint_id: &str,
        param: &str,
        value: Value,
    ) -> Result<Option<Arc<dyn JointController>>, RobotError> {
        let key_error = |reason: String| RobotError::ConfigKey {
            key: key.to_string(),
            reason,
        };
        let value_error = |reason: String| RobotError::InvalidConfigValue {
            key: key.to_string(),
            reason,
        };

        let Some(&i) = self.index.get(joint_id) else {
            return Err(key_error(format!("no joint '{}'", joint_id)));
        };
        let joint = &self.joints[i];

        let parsed = JointParam::parse(param, &value).map_err(|e| match e {
            ParamError::Unknown { .. } => key_error(e.to_string()),
            _ => value_error(e.to_string()),
        })?;

        let mut inner = self.inner.lock();
        joint
            .params()
            .check(&parsed)
            .map_err(|e| value_error(e.to_string()))?;

        let previous = inner.config.get(joint_id, param).cloned();
        inner
            .config
            .set(joint_id, param, value)
            .map_err(|e| key_error(e.to_string()))?;

        if let Err(e) = joint.set_param(parsed) {
            match previous {
                Some(previous) => {
                    // 同一条目刚写入成功，恢复不会失败
                    let restored = inner.config.set(joint_id, param, previous);
                    debug_assert!(restored.is_ok());
                },
                None => {
                    inner.config.remove(joint_id, param);
                },
            }
            return Err(value_error(e.to_string()));
        }

        Ok(matches!(parsed, JointParam::LimitAdj(_)).then(|| joint.clone()))
    }

    /// 把当前配置文档同步写入存储
    pub fn persist(&self) -> Result<(), RobotError> {
        let _guard = self.persist_lock.lock();
        let snapshot = self.config();
        self.store.save(&snapshot)?;
        Ok(())
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("id", &self.id)
            .field("joints", &self.joint_ids().collect::<Vec<_>>())
            .field("flags", &self.flags())
            .finish()
    }
}
