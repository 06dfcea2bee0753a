//! Shared fixtures: recording transport, config builder, telemetry feeder.

use arm_common::axis::AxisConfig;
use arm_common::can::frame::CanFrame;
use arm_common::can::transport::{CanTransport, FrameHandler, TransportError};
use arm_common::can::vesc::{MotorCommand, Telemetry, VescCodec};
use arm_common::config::{ArmConfig, BusConfig, ControlConfig, LogLevel, SharedConfig};
use arm_common::homing::{HomingDefaults, HomingMode, HomingOverrides};
use arm_control::ArmController;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

type SendHook = Arc<dyn Fn(&CanFrame) + Send + Sync>;

/// Transport that records every outbound frame.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<CanFrame>>,
    fail: AtomicBool,
    hook: Mutex<Option<SendHook>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent send fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` after every recorded frame. The hook may send.
    pub fn on_send(&self, hook: impl Fn(&CanFrame) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    pub fn frame_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Decoded `(node, command)` pairs in send order.
    pub fn commands(&self) -> Vec<(u8, MotorCommand)> {
        let codec = VescCodec::default();
        self.sent
            .lock()
            .iter()
            .filter_map(|f| codec.decode_command_frame(f))
            .filter_map(Result::ok)
            .collect()
    }

    pub fn commands_for(&self, node_id: u8) -> Vec<MotorCommand> {
        self.commands()
            .into_iter()
            .filter(|(n, _)| *n == node_id)
            .map(|(_, c)| c)
            .collect()
    }
}

impl CanTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn open(&mut self, _bus: &BusConfig, _axes: &[AxisConfig]) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("injected failure".to_string()));
        }
        self.sent.lock().push(frame.clone());
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(frame);
        }
        Ok(())
    }

    fn set_receiver(&self, _handler: FrameHandler) {}

    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Configuration with default axes for `nodes`.
pub fn config(nodes: &[u8]) -> ArmConfig {
    ArmConfig {
        shared: SharedConfig {
            log_level: LogLevel::Info,
            service_name: "arm-test".to_string(),
        },
        bus: BusConfig::default(),
        control: ControlConfig::default(),
        homing: HomingDefaults::default(),
        axes: nodes.iter().map(|n| AxisConfig::new(*n)).collect(),
    }
}

pub fn controller(nodes: &[u8]) -> (Arc<ArmController>, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new();
    let controller = ArmController::new(&config(nodes), transport.clone());
    (Arc::new(controller), transport)
}

/// Current-mode homing with a short backoff and the given timeout.
pub fn current_homing(timeout_s: f64) -> HomingOverrides {
    HomingOverrides {
        mode: Some(HomingMode::Current),
        current_a: Some(0.3),
        current_threshold_a: Some(0.55),
        collision_dwell_s: Some(0.08),
        timeout_s: Some(timeout_s),
        backoff_deg: Some(0.0),
        ..Default::default()
    }
}

/// Streams STATUS and STATUS_4 frames for one node until dropped.
pub struct Feeder {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Feeder {
    pub fn start(controller: Arc<ArmController>, node_id: u8, current_a: f64, pos_deg: f64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let codec = VescCodec::default();
        let status = codec
            .status_frame(
                node_id,
                &Telemetry::Status {
                    erpm: 0,
                    current_motor: current_a,
                    duty: 0.0,
                },
            )
            .unwrap();
        let status4 = codec
            .status_frame(
                node_id,
                &Telemetry::Status4 {
                    temp_fet: 30.0,
                    temp_motor: 28.0,
                    current_in: 0.1,
                    pos_deg,
                },
            )
            .unwrap();
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                controller.on_receive(&status);
                controller.on_receive(&status4);
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn is_stop(command: &MotorCommand) -> bool {
    matches!(command, MotorCommand::Current(c) if *c == 0.0)
}

pub fn is_drive(command: &MotorCommand) -> bool {
    matches!(command, MotorCommand::Current(c) if *c != 0.0)
}
