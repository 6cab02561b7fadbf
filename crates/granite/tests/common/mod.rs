//! Shared test utilities for granite integration tests.
//!
//! This module provides:
//! - `JobHarness` for running jobs against an isolated output directory
//! - `ScriptedFactory`, a workflow whose failures are configured up front

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::JobHarness;
