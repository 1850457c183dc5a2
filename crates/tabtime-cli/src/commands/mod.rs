//! CLI subcommands.

pub mod clear;
pub mod consolidate;
pub mod replay;
pub mod send;
pub mod status;
pub mod timeline;
