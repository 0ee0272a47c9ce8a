//! # Command Relay
//!
//! A token-authenticated TCP relay that forwards textual commands to a
//! single command-execution authority and reports a per-line result.
//!
//! ## Features
//! - Line-oriented request/response protocol (`<token>:<command>`)
//! - Per-IP allowlisting and connection rate limiting
//! - Bounded worker pool with graceful shutdown
//! - Serialized command execution through one executor task
//! - Hot configuration reload via atomic snapshot swap
//! - Health monitoring via HTTP metrics endpoint

pub mod admin;
pub mod config;
pub mod server;
pub mod utils;
