//! The telemetry and trend engine of a reservoir fill-level node.
//!
//! This crate provides APIs to:
//!
//! - Turn raw ranging samples into validated distances and fill percentages
//! - Estimate the level trend through a linear regression over a bounded
//!   window of recent samples
//! - Decide when telemetry must be published, bounding both message volume
//!   and staleness
//! - Keep a single-slot persistent fault log that survives restarts
//! - Supervise the network link and the message-bus session without ever
//!   blocking the node outside of its startup phase
//! - Schedule a controlled daily restart and suspend all measurements while a
//!   firmware update is being written
//!
//! All hardware and platform services are consumed through small traits,
//! so the same engine runs on a microcontroller and on a hosted system.
//! The [`node::Node`] type ties every component together and must be driven
//! by a single cooperative control loop.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Node configuration.
pub mod config;
/// Supervision of the network link and of the message-bus session.
pub mod connectivity;
/// Error management.
pub mod error;
/// Daily restart scheduling and firmware-update gating.
pub mod failsafe;
/// The single-slot persistent fault log.
pub mod fault;
/// Measurement pipeline and publish decision.
pub mod measurement;
/// The orchestrator that ties all components together.
pub mod node;
/// Reset reasons reported by the platform at boot.
pub mod reset;
/// The ranging-sample capability.
pub mod sensor;
/// The persistent key-value store capability.
pub mod store;
/// Telemetry topics and payloads.
pub mod telemetry;
/// Monotonic and calendar clocks.
pub mod time;
/// Trend estimation over a bounded sample window.
pub mod trend;
/// Firmware-update endpoint events.
pub mod update;
