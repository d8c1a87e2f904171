//! Host-testable library interface for pad2mqtt.
//!
//! All decision logic lives here: the per-key light model, the keypad
//! aggregate, the connectivity state machine, the message router, the
//! MQTT wire codec and the cooperative loop bodies. None of it touches
//! hardware directly - the embedded binary (built with
//! `--features embedded`) supplies [`keypad::KeypadDriver`],
//! [`transport::WirelessLink`] and [`transport::BrokerTransport`]
//! implementations; tests supply mocks.
//!
//! Usage: `cargo test` (host, no embedded toolchain required).

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod keypad;
pub mod link;
pub mod mqtt;
pub mod router;
pub mod service;
pub mod status;
pub mod transport;

pub use error::Error;
