//! Core module containing the analyser driver
//!
//! This module provides:
//! - Transport layer: raw termios serial port plus in-process stand-ins
//! - Line protocol client, command encoding and data-line parsing
//! - Scan and oscilloscope sessions driven by a state machine
//! - Cooperative cancellation
//! - Recording of measurements
//! - A firmware simulator

pub mod cancel;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod simulator;
pub mod state_machine;
pub mod transport;
