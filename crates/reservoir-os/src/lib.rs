//! Platform services for running a reservoir node on an operating system.
//!
//! This crate provides:
//!
//! - A file-backed key-value store
//! - Monotonic and local-time clocks, plus a blocking delay
//! - A network link probing the route towards the broker
//! - An MQTT session with last-will support
//! - A firmware-update channel usable from any thread
//! - A simulated ranging sensor for hosts without ultrasonic hardware
//! - Boot markers deriving the reset reason of the process
//! - A TOML configuration file
//!
//! Every service implements the matching capability of the `reservoir`
//! crate, so a hosted node is built by handing them to
//! `reservoir::node::Node`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Boot markers and reset reasons.
pub mod boot;
/// Clocks and delays.
pub mod clock;
/// Configuration file.
pub mod config;
/// Error management.
pub mod error;
/// MQTT session.
pub mod mqtt;
/// Network link.
pub mod network;
/// Simulated ranging sensor.
pub mod sensor;
/// File-backed key-value store.
pub mod store;
/// Firmware-update channel.
pub mod update;
