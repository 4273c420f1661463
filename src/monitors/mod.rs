//! Reachability probing
//!
//! - [`probe`]: how a single address is checked
//! - [`evaluation`]: what a probe result means for a host's status

pub mod evaluation;
pub mod probe;

pub use evaluation::ReachabilityEvaluation;
pub use probe::{Probe, ProbeOutcome, TcpProbe};
