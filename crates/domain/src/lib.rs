//! Shared types for the Memberkit identity core: the error type, the
//! configuration tree, session/identity data and structured trace events.

pub mod config;
pub mod error;
pub mod session;
pub mod trace;
