mod config_file;
mod control_loop;
mod homing;
mod simulation;
mod support;
mod telemetry;
