//! Lifecycle controller: drives one workload per (user, session) through
//! create, poll, ready or failed, and later stop.
//!
//! ```text
//! Idle -> Creating -> Polling -> Ready | Failed
//! Ready -> Stopping -> Idle
//! ```

mod controller;
pub mod error;
mod tasks;


pub use controller::Controller;
pub use error::SpawnError;
