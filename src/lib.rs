pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod git;
pub mod package;
pub mod report;
pub mod sources;
pub mod stage;
