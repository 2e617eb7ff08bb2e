//! `reservoir-drivers` is a library crate that provides architecture-agnostic
//! drivers for the ranging sensors of a reservoir fill-level node.
//!
//! All drivers are implemented using only the [`embedded-hal`] traits,
//! ensuring compatibility with any platform that supports these
//! abstractions.
//!
//! With the `reservoir` feature, each driver also implements the ranging
//! capability consumed by the `reservoir` engine.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

/// The `HC-SR04` driver.
#[cfg(feature = "hcsr04")]
pub mod hcsr04;
