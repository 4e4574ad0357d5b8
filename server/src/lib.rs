//! Greennet relay server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod janitor;
pub mod registry;
pub mod relay;
pub mod session;
pub mod token;
