//! Outbound command path: codec + transport.

use crate::error::ControlError;
use arm_common::can::frame::CanFrame;
use arm_common::can::transport::CanTransport;
use arm_common::can::vesc::VescCodec;
use arm_common::units::MotorGeometry;
use std::sync::Arc;
use tracing::{debug, trace};

/// Encodes commands and hands them to the transport.
pub struct CommandBus {
    codec: VescCodec,
    transport: Arc<dyn CanTransport>,
}

impl CommandBus {
    pub fn new(codec: VescCodec, transport: Arc<dyn CanTransport>) -> Self {
        Self { codec, transport }
    }

    #[inline]
    pub fn codec(&self) -> &VescCodec {
        &self.codec
    }

    pub fn send(&self, frame: &CanFrame) -> Result<(), ControlError> {
        trace!("tx id={:#x} data={:02x?}", frame.id, frame.payload());
        self.transport.send(frame)?;
        Ok(())
    }

    pub fn set_current(&self, node_id: u8, amps: f64) -> Result<(), ControlError> {
        self.send(&self.codec.set_current(node_id, amps)?)
    }

    /// Velocity command in the joint domain, converted to electrical RPM.
    pub fn set_joint_rpm(
        &self,
        node_id: u8,
        geometry: &MotorGeometry,
        joint_rpm: f64,
    ) -> Result<(), ControlError> {
        self.send(&self.codec.set_rpm(node_id, geometry.erpm(joint_rpm))?)
    }

    /// Make the controller firmware report `deg` at its current position.
    pub fn update_pid_pos_offset(&self, node_id: u8, deg: f64) -> Result<(), ControlError> {
        self.send(&self.codec.update_pid_pos_offset(node_id, deg)?)
    }

    /// Halt motion by releasing motor current.
    pub fn stop_motion(&self, node_id: u8) -> Result<(), ControlError> {
        self.set_current(node_id, 0.0)
    }

    /// Best-effort stop of every listed axis.
    pub fn stop_all(&self, nodes: impl IntoIterator<Item = u8>) {
        for node_id in nodes {
            if let Err(e) = self.stop_motion(node_id) {
                debug!("Stop axis {} failed: {}", node_id, e);
            }
        }
    }
}
