// Shared support code for the lifecycle scenario suites.

pub mod common;
pub mod orchestrator;

pub use common::*;
pub use orchestrator::{Call, FakeOrchestrator};
