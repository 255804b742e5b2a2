//! # QueueCtl Core
//!
//! Core types shared by every queuectl crate: the job record and its
//! lifecycle states, execution outcomes, the enqueue specification, the
//! unified error type, and logging setup.

#![warn(missing_docs)]

pub mod error;
pub mod job;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use job::*;
pub use result::*;
pub use telemetry::{init_logging, LoggingConfig};
