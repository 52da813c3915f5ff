//! Testing utilities for kafkastore
//!
//! Shared fixtures for the unit tests. Everything runs against
//! [`MemoryLog`](crate::kafka::platform::MemoryLog), so no broker is needed.
//! It's only compiled when running tests.
//!
//! # Organization
//! - `mocks.rs` - Test configuration and a recording update handler
//! - `helpers.rs` - Store and topic fixtures

#![cfg(test)]

pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use helpers::{compacted_topic, memory_store};
pub use mocks::{mock_config, RecordingHandler};
