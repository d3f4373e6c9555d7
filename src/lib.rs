pub mod builder;
pub mod config;
pub mod docker;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod naming;
pub mod registry;
pub mod shutdown;
pub mod store;

#[cfg(test)]
mod tests;

pub use lifecycle::{Controller, SpawnError};
