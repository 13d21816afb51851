//! Segue CLI - headless simulator for the playback engine
//!
//! Runs scripted scenarios against simulated media sinks and an adaptive
//! engine on a virtual clock, and reports every event the session emits.

pub mod config;
pub mod error;
pub mod scenario;
pub mod simulator;

pub use config::CliConfig;
pub use error::{CliError, Result};
pub use scenario::{run, Report, Scenario};
