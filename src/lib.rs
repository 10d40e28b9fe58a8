//! streamcheck -- geo-block checks for streaming services across VPN endpoints.
//!
//! This crate drives a VPN provider's CLI through its endpoints one at a time,
//! checks a streaming site through each tunnel, and writes the verdicts to
//! flat tab-separated files.

pub mod config;
pub mod probes;
pub mod report;
pub mod runner;
pub mod vpn;
