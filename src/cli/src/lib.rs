//! A3S Reaper CLI - container registry retention.

pub mod commands;
pub mod logging;
pub mod output;
