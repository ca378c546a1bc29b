//! Command implementations

pub mod config;
pub mod diff;
pub mod files;
pub mod log;
pub mod restore;
pub mod show;
pub mod snapshots;
pub mod status;
pub mod trigger;
