//! Studio CLI
//!
//! Command-line interface for running the dev gateway and inspecting
//! its route and proxy tables.

pub mod commands;
pub mod output;
