//! Builders for constructing configurations in tests.

pub mod config;
