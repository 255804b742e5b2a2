//! # QueueCtl CLI Library
//!
//! Argument parsing, command handlers and output formatting for the
//! `queuectl` binary.

pub mod cli;
pub mod commands;
pub mod output;
pub mod startup;
