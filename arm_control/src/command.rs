//! Command processing root.
//!
//! Hard-stop homing supervision.

pub mod homing;
