//! 演示模式
//!
//! 回零 → 位置扫描 → 速度保持，每一段结束时打印遥测窗口统计。Ctrl+C 中止。

use crate::display::{TerminalSink, render_plot, window_stats};
use anyhow::{Context, Result};
use scope_client::Supervisor;
use scope_protocol::AxisState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

const PLOT_WIDTH: usize = 60;
const POSITION_SWEEP_DEG: [f64; 4] = [90.0, -90.0, 180.0, 0.0];
const VELOCITY_HOLD_RPS: f64 = 5.0;

/// 运行演示
pub fn run_demo(mut supervisor: Supervisor, sink: Arc<TerminalSink>, dwell: Duration) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 收到 Ctrl+C，中止演示...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = demo_steps(&mut supervisor, &sink, &running, dwell);
    supervisor.shutdown();
    result
}

fn demo_steps(
    supervisor: &mut Supervisor,
    sink: &TerminalSink,
    running: &AtomicBool,
    dwell: Duration,
) -> Result<()> {
    // 1. 回零
    println!("⏳ 回零...");
    supervisor.request_homing()?;
    while supervisor.state() == AxisState::Homing && running.load(Ordering::SeqCst) {
        supervisor.wait_event(Duration::from_millis(100));
    }
    if !running.load(Ordering::SeqCst) {
        return Ok(());
    }
    match supervisor.last_homing_outcome() {
        Some(outcome) if outcome.is_success() => println!("✅ 回零完成"),
        Some(outcome) => anyhow::bail!("回零失败: {}", outcome),
        None => anyhow::bail!("回零未返回结果"),
    }

    // 2. 位置扫描
    supervisor.toggle_position_control()?;
    let ranges = supervisor.ranges();
    for target in POSITION_SWEEP_DEG {
        // 遥测故障会把状态机强制切回 Idle
        if !running.load(Ordering::SeqCst) || supervisor.state() != AxisState::PositionControl {
            break;
        }
        let target = ranges.clamp_position(target);
        info!("Position target {} deg", target);
        supervisor.set_position_target(target)?;
        hold(supervisor, running, dwell);
        report(supervisor);
    }
    leave_control(supervisor, AxisState::PositionControl)?;

    // 3. 速度保持
    if running.load(Ordering::SeqCst) && supervisor.state() == AxisState::Idle {
        supervisor.toggle_velocity_control()?;
        supervisor.set_velocity_target(ranges.clamp_velocity(VELOCITY_HOLD_RPS))?;
        hold(supervisor, running, dwell);
        report(supervisor);
        leave_control(supervisor, AxisState::VelocityControl)?;
    }

    println!("📊 显示端共收到 {} 帧", sink.frame_count());
    Ok(())
}

/// 仍处于 `state` 时才切换退出，已被强制回到 Idle 时什么也不做
fn leave_control(supervisor: &mut Supervisor, state: AxisState) -> Result<()> {
    match (supervisor.state(), state) {
        (AxisState::PositionControl, AxisState::PositionControl) => {
            supervisor.toggle_position_control()?
        },
        (AxisState::VelocityControl, AxisState::VelocityControl) => {
            supervisor.toggle_velocity_control()?
        },
        _ => {},
    }
    Ok(())
}

/// 保持一段时间，期间处理后台事件
fn hold(supervisor: &mut Supervisor, running: &AtomicBool, dwell: Duration) {
    let deadline = Instant::now() + dwell;
    while running.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !supervisor.state().is_streaming() {
            break;
        }
        supervisor.wait_event(remaining.min(Duration::from_millis(100)));
    }
}

fn report(supervisor: &Supervisor) {
    let Some(channel) = supervisor.channel() else {
        return;
    };
    let snapshot = supervisor.snapshot();
    let range = supervisor.ranges().display_range(channel);
    println!("{}", render_plot(channel, &snapshot, range, PLOT_WIDTH));
    if window_stats(&snapshot).is_none() {
        println!("⚠️  窗口内尚无采样");
    }
}
