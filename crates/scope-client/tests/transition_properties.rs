//! 状态机性质测试
//!
//! 任意命令序列下，`Supervisor` 的状态等于从 `Idle` 开始对转移表的折叠；
//! 非法命令不改变状态。

use proptest::prelude::*;
use scope_client::state::transition;
use scope_client::{Command, HomingOutcome, ScopeConfig, Supervisor, SupervisorError};
use scope_device::MockDevice;
use scope_driver::NullSink;
use scope_protocol::AxisState;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn manual_config() -> ScopeConfig {
    let mut config = ScopeConfig::default();
    config.poller.period_ms = 60_000;
    config.telemetry.cooperative = true;
    config.motion.homing_timeout_ms = 2_000;
    config
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop::sample::select(Command::ALL.to_vec())
}

fn execute(supervisor: &mut Supervisor, command: Command) -> Result<(), SupervisorError> {
    match command {
        Command::RequestHoming => supervisor.request_homing(),
        Command::HomingComplete if supervisor.state() == AxisState::Homing => {
            // 结果经回零线程自己的事件送达，线程随之被回收
            let deadline = Instant::now() + Duration::from_secs(5);
            while supervisor.state() == AxisState::Homing && Instant::now() < deadline {
                supervisor.wait_event(Duration::from_millis(100));
            }
            Ok(())
        },
        Command::HomingComplete => {
            if supervisor.on_homing_complete(HomingOutcome::Succeeded) {
                Ok(())
            } else {
                Err(SupervisorError::IllegalCommand {
                    command,
                    state: supervisor.state(),
                })
            }
        },
        Command::TogglePositionControl => supervisor.toggle_position_control(),
        Command::ToggleVelocityControl => supervisor.toggle_velocity_control(),
        Command::SetPositionTarget => supervisor.set_position_target(1.0),
        Command::SetVelocityTarget => supervisor.set_velocity_target(1.0),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_state_matches_table_fold(commands in prop::collection::vec(command_strategy(), 0..16)) {
        let device = Arc::new(MockDevice::new());
        let mut supervisor = Supervisor::new(device, Arc::new(NullSink), manual_config()).unwrap();
        let mut model = AxisState::Idle;

        for command in commands {
            let before = supervisor.state();
            let result = execute(&mut supervisor, command);

            match transition(model, command) {
                Some(next) => {
                    prop_assert!(result.is_ok(), "{} failed in {}: {:?}", command, model, result);
                    model = next;
                },
                None => {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(supervisor.state(), before);
                },
            }
            prop_assert_eq!(supervisor.state(), model);
        }

        supervisor.shutdown();
        prop_assert_eq!(supervisor.state(), AxisState::Idle);
    }

    #[test]
    fn prop_target_commands_never_change_state(commands in prop::collection::vec(command_strategy(), 0..12)) {
        let mut state = AxisState::Idle;
        for command in commands {
            if let Some(next) = transition(state, command) {
                state = next;
            }
            for probe in [Command::SetPositionTarget, Command::SetVelocityTarget] {
                let target = transition(state, probe);
                prop_assert!(target.is_none() || target == Some(state));
            }
        }
    }
}
