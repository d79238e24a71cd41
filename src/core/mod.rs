//! Save cache internals
//!
//! Layered bottom-up: the package codec and long-name frame, the device
//! boundary, the fingerprinted cache over it, and the staged streams and
//! backends the save manager routes between.

pub mod backend;
pub mod cache;
pub mod compression;
pub mod config;
pub mod device;
pub mod error;
pub mod fingerprint;
pub mod frame;
pub mod icon;
pub mod manager;
pub mod naming;
pub mod package;
pub mod pattern;
pub mod stream;
