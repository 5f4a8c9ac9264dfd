//! Shared harness for end-to-end exporter tests

pub mod common;
