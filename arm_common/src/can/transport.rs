//! Transport trait and error types.
//!
//! The arm core never opens or closes the bus itself; a [`CanTransport`]
//! implementation owns the physical (or emulated) bus, and frames flow in
//! through a registered [`FrameHandler`].

use super::frame::CanFrame;
use crate::axis::AxisConfig;
use crate::config::BusConfig;
use std::sync::Arc;
use thiserror::Error;

/// Error types for transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// `send` called before `open` or after `close`.
    #[error("Transport is not open")]
    NotOpen,

    /// The bus rejected the frame.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Driver-specific configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Bus or driver resources could not be acquired.
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// No driver registered under the requested name.
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
}

/// Callback invoked once per inbound frame, in receive order.
pub type FrameHandler = Arc<dyn Fn(&CanFrame) + Send + Sync>;

/// Factory function type for creating transport instances.
pub type TransportFactory = fn() -> Box<dyn CanTransport>;

/// Frame counters reported by a transport.
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub send_errors: u64,
}

/// Interface for pluggable CAN bus drivers.
///
/// # Lifecycle
///
/// 1. `open()` - exclusive access, before the transport is shared
/// 2. `set_receiver()` / `send()` - from any thread
/// 3. `close()` - stops delivery; later sends fail with `NotOpen`
pub trait CanTransport: Send + Sync {
    /// Driver identifier (e.g. "simulation").
    fn name(&self) -> &'static str;

    /// Acquire the bus.
    ///
    /// `axes` lets emulating drivers create one node per configured axis.
    fn open(&mut self, bus: &BusConfig, axes: &[AxisConfig]) -> Result<(), TransportError>;

    /// Send one frame.
    fn send(&self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Install the inbound frame callback, replacing any previous one.
    fn set_receiver(&self, handler: FrameHandler);

    /// Release the bus. Idempotent.
    fn close(&self) -> Result<(), TransportError>;

    /// Frame counters. Default: None.
    fn stats(&self) -> Option<TransportStats> {
        None
    }
}
