//! 交互式 Shell
//!
//! 专用输入线程 + crossbeam 通道：rustyline 在输入线程中阻塞读取，
//! 主线程持有 `Supervisor`，在等待输入的间隙处理后台事件。

use crate::display::{TerminalSink, render_plot};
use anyhow::Result;
use crossbeam_channel::{Receiver, bounded, select};
use rustyline::Editor;
use scope_client::Supervisor;
use scope_protocol::AxisState;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const PLOT_WIDTH: usize = 60;
const HISTORY_FILE: &str = ".scope_history";
const INTERRUPT: &str = "SIGINT";

/// Shell 命令
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Home,
    Position,
    Velocity,
    Target(f64),
    Status,
    Plot,
    Help,
    Exit,
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("未知命令: {0}（输入 'help' 查看帮助）")]
    Unknown(String),
    #[error("缺少参数: {0}")]
    MissingArgument(&'static str),
    #[error("无效的数值: {0}")]
    InvalidNumber(String),
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err(ParseError::Unknown(String::new()));
        };

        match head {
            "home" => Ok(ShellCommand::Home),
            "position" | "pc" => Ok(ShellCommand::Position),
            "velocity" | "vc" => Ok(ShellCommand::Velocity),
            "target" | "t" => {
                let raw = parts.next().ok_or(ParseError::MissingArgument("target <value>"))?;
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(ShellCommand::Target)
                    .ok_or_else(|| ParseError::InvalidNumber(raw.to_string()))
            },
            "status" => Ok(ShellCommand::Status),
            "plot" => Ok(ShellCommand::Plot),
            "help" | "?" => Ok(ShellCommand::Help),
            "exit" | "quit" => Ok(ShellCommand::Exit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Shell 输入（专用输入线程）
pub struct ShellInput {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ShellInput {
    pub fn new() -> Self {
        let (command_tx, command_rx) = bounded::<String>(10);

        let input_thread = thread::spawn(move || {
            use rustyline::history::DefaultHistory;

            let mut rl = Editor::<(), DefaultHistory>::new()
                .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;
            rl.load_history(HISTORY_FILE).ok();

            loop {
                match rl.readline("scope> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        let _ = rl.add_history_entry(line.clone());
                        let exit = line == "exit" || line == "quit";
                        if command_tx.send(line).is_err() || exit {
                            break;
                        }
                    },
                    Err(rustyline::error::ReadlineError::Interrupted) => {
                        println!("^C");
                        let _ = command_tx.send(INTERRUPT.to_string());
                    },
                    Err(rustyline::error::ReadlineError::Eof) => {
                        let _ = command_tx.send("exit".to_string());
                        break;
                    },
                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    },
                }
            }

            rl.save_history(HISTORY_FILE).ok();
            Ok(())
        });

        Self {
            command_rx,
            _input_thread: input_thread,
        }
    }
}

/// 运行 Shell
pub fn run_shell(mut supervisor: Supervisor, sink: Arc<TerminalSink>) -> Result<()> {
    println!("Scope CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("输入 'help' 查看帮助，'exit' 退出");
    println!();

    let input = ShellInput::new();

    loop {
        select! {
            recv(input.command_rx) -> msg => {
                let Ok(line) = msg else {
                    break;
                };

                if line == INTERRUPT {
                    interrupt(&mut supervisor);
                    continue;
                }

                match ShellCommand::parse(&line) {
                    Ok(ShellCommand::Exit) => break,
                    Ok(command) => {
                        if let Err(err) = execute(&mut supervisor, &sink, command) {
                            eprintln!("❌ {}", err);
                        }
                    },
                    Err(err) => eprintln!("❌ {}", err),
                }
            },
            default(Duration::from_millis(50)) => {},
        }

        supervisor.process_events();
    }

    println!("⏳ 正在关闭...");
    supervisor.shutdown();
    println!("👋 再见！");
    Ok(())
}

/// Ctrl+C：退出控制模式（回零无法中断，只提示）
fn interrupt(supervisor: &mut Supervisor) {
    let result = match supervisor.state() {
        AxisState::PositionControl => supervisor.toggle_position_control(),
        AxisState::VelocityControl => supervisor.toggle_velocity_control(),
        AxisState::Homing => {
            eprintln!("⚠️  回零进行中，等待结束");
            Ok(())
        },
        _ => Ok(()),
    };
    if let Err(err) = result {
        eprintln!("❌ {}", err);
    }
}

fn execute(supervisor: &mut Supervisor, sink: &TerminalSink, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Home => supervisor.request_homing()?,
        ShellCommand::Position => supervisor.toggle_position_control()?,
        ShellCommand::Velocity => supervisor.toggle_velocity_control()?,
        ShellCommand::Target(value) => {
            let ranges = supervisor.ranges();
            match supervisor.state() {
                AxisState::PositionControl => {
                    let clamped = ranges.clamp_position(value);
                    supervisor.set_position_target(clamped)?;
                    println!("✅ 位置目标: {:.2} deg", clamped);
                },
                AxisState::VelocityControl => {
                    let clamped = ranges.clamp_velocity(value);
                    supervisor.set_velocity_target(clamped)?;
                    println!("✅ 速度目标: {:.2} rps", clamped);
                },
                state => anyhow::bail!("target 仅在位置或速度控制下可用（当前: {}）", state),
            }
        },
        ShellCommand::Status => print_status(supervisor, sink),
        ShellCommand::Plot => {
            let Some(channel) = supervisor.channel() else {
                anyhow::bail!("尚无遥测数据，请先进入位置或速度控制");
            };
            let range = supervisor.ranges().display_range(channel);
            println!("{}", render_plot(channel, &supervisor.snapshot(), range, PLOT_WIDTH));
        },
        ShellCommand::Help => print_help(),
        ShellCommand::Exit => {},
    }
    Ok(())
}

fn print_status(supervisor: &Supervisor, sink: &TerminalSink) {
    println!("📊 状态: {}", supervisor.state());
    if let Some(channel) = supervisor.channel() {
        println!("   通道: {}", channel);
    }
    if let Some(outcome) = supervisor.last_homing_outcome() {
        println!("   上次回零: {}", outcome);
    }
    if let Some(sample) = supervisor.latest() {
        println!("   最新采样: t={:.3}s value={:.3}", sample.time, sample.value);
    }
    if let Some(pump) = supervisor.telemetry() {
        println!(
            "   遥测: {} 帧, 采样 {}, 丢弃 {}",
            pump.tick_count(),
            pump.poller().sample_count(),
            pump.poller().dropped_count()
        );
    }
    println!("   显示端: {} 帧", sink.frame_count());
}

fn print_help() {
    println!("可用命令:");
    println!("  home              开始回零");
    println!("  position | pc     进入 / 退出位置控制");
    println!("  velocity | vc     进入 / 退出速度控制");
    println!("  target <value>    设置目标（deg 或 rps，按范围限幅）");
    println!("  status            显示状态");
    println!("  plot              绘制当前遥测窗口");
    println!("  help              显示帮助");
    println!("  exit | quit       退出");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ShellCommand::parse("home"), Ok(ShellCommand::Home));
        assert_eq!(ShellCommand::parse("pc"), Ok(ShellCommand::Position));
        assert_eq!(ShellCommand::parse("velocity"), Ok(ShellCommand::Velocity));
        assert_eq!(ShellCommand::parse("target -12.5"), Ok(ShellCommand::Target(-12.5)));
        assert_eq!(ShellCommand::parse("quit"), Ok(ShellCommand::Exit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ShellCommand::parse("target"),
            Err(ParseError::MissingArgument("target <value>"))
        );
        assert_eq!(
            ShellCommand::parse("target abc"),
            Err(ParseError::InvalidNumber("abc".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("target NaN"),
            Err(ParseError::InvalidNumber("NaN".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("jump"),
            Err(ParseError::Unknown("jump".to_string()))
        );
    }
}
