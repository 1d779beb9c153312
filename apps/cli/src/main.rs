//! # Scope CLI
//!
//! 单轴伺服监控命令行工具，驱动一个仿真轴。
//!
//! ## 模式
//!
//! ### Shell 模式（交互调试）
//!
//! ```bash
//! $ scope-cli shell
//! scope> home
//! scope> position
//! scope> target 90
//! scope> plot
//! scope> exit
//! ```
//!
//! ### Demo 模式
//!
//! ```bash
//! scope-cli demo --dwell-ms 1500
//! ```
//!
//! ### 配置
//!
//! ```bash
//! scope-cli config init scope.toml
//! scope-cli --config scope.toml config show
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scope_client::{ScopeConfig, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod commands;
mod display;
mod modes;
mod sim;

use commands::ConfigCommand;
use display::TerminalSink;
use modes::demo::run_demo;
use modes::shell::run_shell;
use sim::{SimAxis, SimOptions};

/// Scope CLI - 单轴伺服监控工具
#[derive(Parser, Debug)]
#[command(name = "scope-cli")]
#[command(about = "Single-axis servo supervisor with live telemetry", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动交互式 Shell
    Shell {
        #[command(flatten)]
        sim: SimArgs,
    },

    /// 运行脚本化演示：回零、位置扫描、速度保持
    Demo {
        #[command(flatten)]
        sim: SimArgs,

        /// 每个目标的保持时间（毫秒）
        #[arg(long, default_value_t = 1500)]
        dwell_ms: u64,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// 仿真轴参数
#[derive(Args, Debug)]
struct SimArgs {
    /// 让仿真轴回零失败
    #[arg(long)]
    fail_homing: bool,

    /// 仿真回零耗时（毫秒）
    #[arg(long, default_value_t = 800)]
    homing_ms: u64,

    /// 覆盖遥测刷新率（Hz）
    #[arg(long)]
    fps: Option<u32>,

    /// 覆盖显示窗口采样数
    #[arg(long)]
    samples: Option<usize>,

    /// 在主线程中驱动遥测（不启动定时线程）
    #[arg(long)]
    cooperative: bool,
}

impl SimArgs {
    fn apply(&self, config: &mut ScopeConfig) {
        if let Some(fps) = self.fps {
            config.telemetry.fps = fps;
        }
        if let Some(samples) = self.samples {
            config.telemetry.n_samples = samples;
        }
        if self.cooperative {
            config.telemetry.cooperative = true;
        }
    }

    fn options(&self, config: &ScopeConfig) -> SimOptions {
        SimOptions {
            homing_duration: Duration::from_millis(self.homing_ms),
            fail_homing: self.fail_homing,
            axis_timeout: config.axis_timeout(),
            ..Default::default()
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ScopeConfig> {
    match path {
        Some(path) => ScopeConfig::load_from_file(path)
            .with_context(|| format!("加载配置失败: {}", path.display())),
        None => Ok(ScopeConfig::default()),
    }
}

fn build(sim: &SimArgs, mut config: ScopeConfig) -> Result<(Supervisor, Arc<TerminalSink>)> {
    sim.apply(&mut config);
    let axis = Arc::new(SimAxis::new(sim.options(&config)));
    let sink = Arc::new(TerminalSink::new());
    info!(
        "Simulated axis ready (poll {} ms, {} fps, {} samples)",
        config.poller.period_ms, config.telemetry.fps, config.telemetry.n_samples
    );
    let supervisor = Supervisor::new(axis, sink.clone(), config)?;
    Ok((supervisor, sink))
}

fn main() -> Result<()> {
    // 初始化日志（写到 stderr，stdout 留给命令输出）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scope_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config),

        Commands::Shell { sim } => {
            let (supervisor, sink) = build(&sim, config)?;
            run_shell(supervisor, sink)
        },

        Commands::Demo { sim, dwell_ms } => {
            let (supervisor, sink) = build(&sim, config)?;
            run_demo(supervisor, sink, Duration::from_millis(dwell_ms))
        },
    }
}
