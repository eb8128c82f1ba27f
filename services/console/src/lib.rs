//! Bidichat Console Service
//!
//! This library wires the pure reassembly engine from `bidichat-core` to the
//! real world: a WebSocket connection with automatic reconnection, cpal
//! microphone capture and speaker playback, JPEG still-image sending, and a
//! terminal front end. The `bin/console.rs` binary is a thin wrapper around
//! this library.

pub mod audio;
pub mod capture;
pub mod config;
pub mod connection;
pub mod log;
pub mod media;
pub mod playback;
pub mod session;
