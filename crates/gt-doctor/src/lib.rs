//! Health checks and self-healing for a town of rigs.
//!
//! A [`Doctor`] runs the checks of a [`CheckRegistry`] against a
//! [`CheckContext`] and collects their results into a [`Report`]. In fix
//! mode every failing, fixable check is repaired and then run again, so the
//! reported status is always one that was observed, never assumed.

pub mod check;
pub mod checks;
pub mod config;
pub mod context;
pub mod doctor;
pub mod error;
pub mod probe;
pub mod report;

pub use check::{Category, Check, CheckResult, CheckStatus};
pub use config::{ConfigError, DoctorConfig};
pub use context::CheckContext;
pub use doctor::{CheckRegistry, Doctor};
pub use error::FixError;
pub use probe::{ProbeOutcome, ToolProbe};
pub use report::{Report, Summary};
