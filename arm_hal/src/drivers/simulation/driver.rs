//! Simulated bus implementation.
//!
//! `SimulatedBus` implements `CanTransport`. Outbound frames are decoded and
//! applied to the addressed `SimNode` synchronously inside `send`; a worker
//! thread steps node physics and delivers status frames to the receiver.

use super::SimulationConfig;
use super::node::SimNode;
use arm_common::axis::AxisConfig;
use arm_common::can::frame::CanFrame;
use arm_common::can::transport::{CanTransport, FrameHandler, TransportError, TransportStats};
use arm_common::can::vesc::VescCodec;
use arm_common::config::BusConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// State shared between the transport handle and its worker thread.
struct BusShared {
    nodes: Mutex<BTreeMap<u8, SimNode>>,
    handler: RwLock<Option<FrameHandler>>,
    running: AtomicBool,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    send_errors: AtomicU64,
}

/// Simulation transport implementing the `CanTransport` trait.
pub struct SimulatedBus {
    codec: VescCodec,
    shared: Arc<BusShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {
            codec: VescCodec::default(),
            shared: Arc::new(BusShared {
                nodes: Mutex::new(BTreeMap::new()),
                handler: RwLock::new(None),
                running: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
                frames_received: AtomicU64::new(0),
                send_errors: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Inspect one emulated node.
    pub fn with_node<R>(&self, node_id: u8, f: impl FnOnce(&SimNode) -> R) -> Option<R> {
        self.shared.nodes.lock().get(&node_id).map(f)
    }

    pub fn is_open(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CanTransport for SimulatedBus {
    fn name(&self) -> &'static str {
        super::DRIVER_NAME
    }

    fn open(&mut self, bus: &BusConfig, axes: &[AxisConfig]) -> Result<(), TransportError> {
        if self.is_open() {
            return Err(TransportError::InitFailed("bus already open".to_string()));
        }
        let cfg = SimulationConfig::from_bus(bus)?;
        self.codec = VescCodec::new(bus.id_format);

        {
            let mut nodes = self.shared.nodes.lock();
            nodes.clear();
            for axis in axes {
                nodes.insert(
                    axis.node_id,
                    SimNode::new(axis.node_id, axis.geometry(), cfg.clone()),
                );
            }
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let codec = self.codec;
        let worker_cfg = cfg.clone();
        let handle = std::thread::Builder::new()
            .name("sim-can-bus".to_string())
            .spawn(move || run_bus(shared, codec, worker_cfg))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                TransportError::InitFailed(e.to_string())
            })?;
        *self.worker.lock() = Some(handle);

        info!(
            "Simulated CAN bus open: {} nodes, {:?}, step {} ms, status every {} ms",
            axes.len(),
            bus.id_format,
            cfg.step_ms,
            cfg.status_period_ms
        );
        Ok(())
    }

    fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if !self.is_open() {
            self.shared.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::NotOpen);
        }
        self.shared.frames_sent.fetch_add(1, Ordering::Relaxed);

        match self.codec.decode_command_frame(frame) {
            None => trace!("Sim bus: ignoring foreign frame id={:#x}", frame.id),
            Some(Err(e)) => debug!("Sim bus: undecodable frame id={:#x}: {}", frame.id, e),
            Some(Ok((node_id, command))) => {
                let mut nodes = self.shared.nodes.lock();
                match nodes.get_mut(&node_id) {
                    Some(node) => node.apply(command, Instant::now()),
                    None => trace!("Sim bus: no node {} on bus", node_id),
                }
            }
        }
        Ok(())
    }

    fn set_receiver(&self, handler: FrameHandler) {
        *self.shared.handler.write() = Some(handler);
    }

    fn close(&self) -> Result<(), TransportError> {
        let was_open = self.shared.running.swap(false, Ordering::AcqRel);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("Sim bus worker panicked");
            }
        }
        if was_open {
            info!("Simulated CAN bus closed");
        }
        Ok(())
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(TransportStats {
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            frames_received: self.shared.frames_received.load(Ordering::Relaxed),
            send_errors: self.shared.send_errors.load(Ordering::Relaxed),
        })
    }
}

impl Drop for SimulatedBus {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Worker loop: step physics, emit status bursts, sleep the remainder.
fn run_bus(shared: Arc<BusShared>, codec: VescCodec, cfg: SimulationConfig) {
    let step = cfg.step();
    let status_period = cfg.status_period();
    let mut last = Instant::now();
    let mut last_status = last;
    let mut outbound: Vec<CanFrame> = Vec::new();

    while shared.running.load(Ordering::Acquire) {
        let tick_start = Instant::now();
        let dt = tick_start.saturating_duration_since(last);
        last = tick_start;
        let emit = tick_start.saturating_duration_since(last_status) >= status_period;

        {
            let mut nodes = shared.nodes.lock();
            for node in nodes.values_mut() {
                node.step(dt, tick_start);
                if !emit {
                    continue;
                }
                for telemetry in node.telemetry() {
                    match codec.status_frame(node.node_id(), &telemetry) {
                        Ok(frame) => outbound.push(frame),
                        Err(e) => warn!("Sim node {}: status encode failed: {}", node.node_id(), e),
                    }
                }
            }
        }
        if emit {
            last_status = tick_start;
        }

        // Deliver outside the node lock: receivers may send in response.
        if !outbound.is_empty() {
            let handler = shared.handler.read().clone();
            if let Some(handler) = handler {
                for frame in &outbound {
                    handler(frame);
                }
                shared
                    .frames_received
                    .fetch_add(outbound.len() as u64, Ordering::Relaxed);
            }
            outbound.clear();
        }

        let elapsed = tick_start.elapsed();
        if elapsed < step {
            std::thread::sleep(step - elapsed);
        }
    }
    debug!("Sim bus worker exiting");
}
