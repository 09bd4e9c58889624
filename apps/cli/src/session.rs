//! 机械臂会话：加载描述文件、打开总线、构造 Robot

use anyhow::{Context, Result};
use arm_config::{ArmConfig, ConfigStore, JsonFileStore};
use arm_joint::{RxThread, SimJointFactory};
use arm_robot::{Robot, RobotBuilder};
use clap::Args;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 关节来源（二选一）
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// 使用仿真关节
    #[arg(long)]
    pub sim: bool,

    /// SocketCAN 接口（如 can0）
    #[arg(short, long)]
    pub interface: Option<String>,
}

/// 所有命令共用的参数
#[derive(Args, Debug, Clone)]
pub struct RobotArgs {
    /// 机械臂描述文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// `<config_dir>/arm`
pub fn default_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("cannot determine config directory")?;
    Ok(dir.join("arm"))
}

impl RobotArgs {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(default_dir()?.join("arm.toml")),
        }
    }
}

/// 打开的机械臂
///
/// drop 时先释放 Robot，再停止接收线程。
pub struct Session {
    pub robot: Arc<Robot>,
    pub arm: ArmConfig,
    pub store_path: PathBuf,
    rx: Option<RxThread>,
}

impl Session {
    pub fn open(args: &RobotArgs) -> Result<Self> {
        let path = args.config_path()?;
        let arm = ArmConfig::load(&path)
            .with_context(|| format!("failed to load arm description {}", path.display()))?;

        let store_path = match &arm.store {
            Some(store) => store.clone(),
            None => default_dir()?.join(format!("{}.json", arm.id)),
        };
        if let Some(parent) = store_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::new(&store_path));

        let builder = RobotBuilder::from_arm_config(&arm).store(store);
        let (robot, rx) = match &args.target.interface {
            Some(interface) => open_bus(builder, interface)?,
            None => (builder.factory(SimJointFactory).build()?, None),
        };

        info!(
            "Arm {} opened ({} joint(s), {}, params {})",
            arm.id,
            arm.joints.len(),
            args.target.interface.as_deref().unwrap_or("simulated"),
            store_path.display()
        );
        Ok(Self {
            robot,
            arm,
            store_path,
            rx,
        })
    }

    /// 是否连接真实总线
    pub fn is_bus(&self) -> bool {
        self.rx.is_some()
    }
}

#[cfg(target_os = "linux")]
fn open_bus(builder: RobotBuilder, interface: &str) -> Result<(Arc<Robot>, Option<RxThread>)> {
    use arm_can::{BusChannel, SocketCanBus};
    use arm_joint::{BusJointFactory, FrameRouter, RxConfig};

    let channel: Arc<dyn BusChannel> = Arc::new(
        SocketCanBus::open(interface).with_context(|| format!("failed to open {}", interface))?,
    );
    let router = Arc::new(FrameRouter::new());
    let robot = builder
        .factory(BusJointFactory::new(channel.clone(), router.clone()))
        .build()?;
    let rx = RxThread::spawn(channel, router, RxConfig::default())?;
    Ok((robot, Some(rx)))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_builder: RobotBuilder, interface: &str) -> Result<(Arc<Robot>, Option<RxThread>)> {
    anyhow::bail!("SocketCAN interface '{}' requires Linux", interface)
}

/// 命令行值：合法 JSON 按 JSON 解析，否则视为字符串
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("2.5"), json!(2.5));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("dark"), json!("dark"));
        assert_eq!(parse_value("\"5\""), json!("5"));
        assert_eq!(parse_value("null"), Value::Null);
    }

    #[test]
    fn test_open_sim_session_with_relative_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("arm.toml");
        fs::write(
            &config,
            r#"
id = "bench"
store = "params/bench.json"

[[joints]]
id = "j0"
bus_address = 1

[[joints]]
id = "j1"
bus_address = 2
"#,
        )
        .unwrap();

        let args = RobotArgs {
            config: Some(config),
            target: TargetArgs {
                sim: true,
                interface: None,
            },
        };
        let session = Session::open(&args).unwrap();

        assert!(!session.is_bus());
        assert_eq!(session.store_path, dir.path().join("params/bench.json"));
        assert!(session.store_path.exists());
        assert!(session.robot.flags().ready);
    }

    #[test]
    fn test_open_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = RobotArgs {
            config: Some(dir.path().join("missing.toml")),
            target: TargetArgs {
                sim: true,
                interface: None,
            },
        };
        assert!(Session::open(&args).is_err());
    }
}
