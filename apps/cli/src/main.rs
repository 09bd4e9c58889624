//! # Arm CLI
//!
//! 多关节机械臂命令行工具。
//!
//! ```bash
//! # 仿真关节，启动周期动作并回零
//! arm-cli run --config arm.toml --sim --home
//!
//! # 真实总线
//! arm-cli run --config arm.toml --interface can0
//!
//! # 修改关节参数并写入参数文件
//! arm-cli set j0.limitAdj 2.5 --persist --sim
//!
//! # 输出 state / meta
//! arm-cli show --sim
//! ```
//!
//! 未指定 `--config` 时使用 `<config_dir>/arm/arm.toml`。

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod session;

use commands::{HomeCommand, RunCommand, SetCommand, ShowCommand};

/// Arm CLI - 机械臂命令行工具
#[derive(Parser, Debug)]
#[command(name = "arm-cli")]
#[command(about = "Command-line interface for multi-joint robot arm control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动周期动作，直到 Ctrl-C
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 所有关节回零并等待完成
    Home {
        #[command(flatten)]
        args: HomeCommand,
    },

    /// 更新一个配置项
    Set {
        #[command(flatten)]
        args: SetCommand,
    },

    /// 输出 state 和 meta（JSON）
    Show {
        #[command(flatten)]
        args: ShowCommand,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("arm_cli=info,arm_robot=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Home { args } => args.execute(),
        Commands::Set { args } => args.execute(),
        Commands::Show { args } => args.execute(),
    }
}
