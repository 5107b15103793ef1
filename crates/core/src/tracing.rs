//! Tracing setup shared by the Latch binaries
//!
//! Library code only emits events through the `tracing` macros; installing a
//! subscriber is left to whoever owns `main`.

pub mod config;
pub mod init;

pub use config::InstrumentationConfig;
pub use init::{init_default, init_tracing};
