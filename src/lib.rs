//! reelcast - cast local media files to a network receiver.
//!
//! This library crate exposes the application wiring for the binary and for
//! integration testing.

pub mod app;
pub mod config;
pub mod receiver;

pub use app::App;
