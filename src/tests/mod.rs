//! Scenario tests for the lifecycle controller.
//!
//! Every suite drives a real `Controller` against the scripted
//! orchestrator in `support`, so no Docker daemon is needed.


pub mod support;
