#![forbid(unsafe_code)]

pub mod config;
pub mod emulator;
pub mod entries;
pub mod errors;
pub mod protocol;
pub mod pump;
pub mod resource;
pub mod runner;
pub mod session;
pub mod stats;

pub use config::HarnessConfig;
pub use errors::{HarnessError, Result};
