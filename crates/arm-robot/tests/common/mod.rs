//! 测试用关节：记录收到的命令，由测试手动驱动事件

#![allow(dead_code)]

use arm_config::{ConfigStore, MemoryStore};
use arm_joint::{
    EventSink, JointConfig, JointController, JointError, JointEventKind, JointFactory, JointParam,
    JointParams, JointState,
};
use arm_robot::{Robot, RobotBuilder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// 关节收到的命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    WriteSetPoint,
    SetPosition(f64, Option<f64>),
    GoHome,
    Reset,
    Enable,
    Disable,
    Zero,
    Calibrate,
    QueryPosition,
    QueryParameter(u16, u8),
    UpdateZeroStep,
    SetParam(JointParam),
}

pub struct MockJoint {
    id: String,
    bus_address: u8,
    events: EventSink,
    params: Mutex<JointParams>,
    state: Mutex<JointState>,
    commands: Mutex<Vec<Command>>,
    /// 所有关节共享，记录跨关节的命令顺序
    log: CommandLog,
    fail: Mutex<bool>,
    before_home: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

pub type CommandLog = Arc<Mutex<Vec<(String, Command)>>>;

impl MockJoint {
    fn new(config: &JointConfig, events: EventSink, log: CommandLog) -> Self {
        Self {
            id: config.id.clone(),
            bus_address: config.bus_address,
            events,
            params: Mutex::new(config.params),
            state: Mutex::new(JointState::new(config.id.clone(), config.bus_address)),
            commands: Mutex::new(Vec::new()),
            log,
            fail: Mutex::new(false),
            before_home: Mutex::new(None),
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub fn count(&self, command: &Command) -> usize {
        self.commands.lock().iter().filter(|c| *c == command).count()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    /// 之后的命令全部失败
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// `go_home` 开始处理前执行的回调
    pub fn set_before_home(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.before_home.lock() = Some(Box::new(hook));
    }

    pub fn set_homed(&self, homed: bool) {
        self.state.lock().homed = homed;
    }

    /// 模拟驱动器报告回零完成
    pub fn complete_home(&self) {
        {
            let mut state = self.state.lock();
            state.homed = true;
            state.homing = false;
        }
        self.events.emit(JointEventKind::Home);
    }

    pub fn emit(&self, kind: JointEventKind) {
        self.events.emit(kind);
    }

    pub fn set_position_reading(&self, position: f64) {
        self.state.lock().position = position;
    }

    fn record(&self, command: Command) -> Result<(), JointError> {
        self.log.lock().push((self.id.clone(), command.clone()));
        self.commands.lock().push(command);
        if *self.fail.lock() {
            return Err(JointError::InvalidArgument(format!("{} rejected", self.id)));
        }
        Ok(())
    }
}

impl JointController for MockJoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn bus_address(&self) -> u8 {
        self.bus_address
    }

    fn write_set_point(&self) -> Result<(), JointError> {
        self.record(Command::WriteSetPoint)
    }

    fn set_position(&self, position: f64, velocity: Option<f64>) -> Result<(), JointError> {
        self.record(Command::SetPosition(position, velocity))?;
        self.state.lock().set_point = Some(position);
        Ok(())
    }

    fn go_home(&self) -> Result<(), JointError> {
        if let Some(hook) = self.before_home.lock().as_ref() {
            hook();
        }
        self.record(Command::GoHome)?;
        {
            let mut state = self.state.lock();
            state.homing = true;
            state.homed = false;
        }
        self.events.emit(JointEventKind::Homing);
        Ok(())
    }

    fn reset(&self) -> Result<(), JointError> {
        self.record(Command::Reset)
    }

    fn enable(&self) -> Result<(), JointError> {
        self.record(Command::Enable)
    }

    fn disable(&self) -> Result<(), JointError> {
        self.record(Command::Disable)
    }

    fn zero(&self) -> Result<(), JointError> {
        self.record(Command::Zero)
    }

    fn calibrate(&self) -> Result<(), JointError> {
        self.record(Command::Calibrate)
    }

    fn query_position(&self) -> Result<(), JointError> {
        self.record(Command::QueryPosition)
    }

    fn query_parameter(&self, index: u16, subindex: u8) -> Result<(), JointError> {
        self.record(Command::QueryParameter(index, subindex))
    }

    fn update_zero_step(&self) -> Result<(), JointError> {
        self.record(Command::UpdateZeroStep)
    }

    fn set_param(&self, param: JointParam) -> Result<(), JointError> {
        self.record(Command::SetParam(param))?;
        self.params.lock().apply(param)?;
        Ok(())
    }

    fn params(&self) -> JointParams {
        *self.params.lock()
    }

    fn state(&self) -> JointState {
        self.state.lock().clone()
    }
}

/// 记录创建出的关节，测试按 id 取回
#[derive(Default)]
pub struct MockFactory {
    joints: Mutex<HashMap<String, Arc<MockJoint>>>,
    log: CommandLog,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, id: &str) -> Arc<MockJoint> {
        self.joints.lock()[id].clone()
    }

    /// 所有关节收到的命令（按到达顺序）
    pub fn log(&self) -> Vec<(String, Command)> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}

impl JointFactory for MockFactory {
    fn create(
        &self,
        config: &JointConfig,
        events: EventSink,
    ) -> Result<Arc<dyn JointController>, JointError> {
        let joint = Arc::new(MockJoint::new(config, events, self.log.clone()));
        self.joints.lock().insert(config.id.clone(), joint.clone());
        Ok(joint)
    }
}

pub const JOINTS: [&str; 3] = ["j0", "j1", "j2"];

/// 三关节机械臂 + 内存存储
pub struct Fixture {
    pub robot: Arc<Robot>,
    pub factory: Arc<MockFactory>,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let factory = MockFactory::new();
        let store = Arc::new(store);
        let robot = RobotBuilder::new("arm")
            .joints(
                JOINTS
                    .iter()
                    .enumerate()
                    .map(|(i, id)| JointConfig::new(*id, i as u8 + 1)),
            )
            .shared_factory(factory.clone())
            .store(store.clone() as Arc<dyn ConfigStore>)
            .build()
            .unwrap();

        Self {
            robot,
            factory,
            store,
        }
    }

    pub fn joint(&self, id: &str) -> Arc<MockJoint> {
        self.factory.get(id)
    }
}
