//! Toolyard - login admission and result memoization
//!
//! This crate holds the two stateful pieces of the Toolyard inventory
//! service: an admission guard that throttles failed logins per client, and a
//! tiered memoization store for expensive dashboard and report queries.

pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod memo;
