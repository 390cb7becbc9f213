//! Side-effecting adapters: configuration, catalog, staging, persistence,
//! terminals.

pub mod catalog;
pub mod config;
pub mod mutate;
pub mod staging;
pub mod store;
pub mod terminal;
