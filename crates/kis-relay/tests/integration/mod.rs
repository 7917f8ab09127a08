//! Integration test modules.

pub mod common;
