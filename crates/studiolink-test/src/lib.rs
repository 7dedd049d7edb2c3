//! Test harnesses for studiolink.
//!
//! Provides `MockStudio`, a scripted WebSocket peer that speaks the studio
//! request/reply protocol, and the CLI regression tests for the
//! `studiolink` binary.

#[cfg(test)]
pub mod cli;
pub mod studio;

pub use studio::{find_available_port, MockStudio, StudioError};
