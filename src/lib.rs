// ABOUTME: Library root for fleetrun - the execution engine plus inventory and output layers.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod output;
pub mod types;
