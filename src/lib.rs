#![doc = include_str!("../README.md")]

/// Calendar windows mapping dates to `Major.Minor`.
pub mod calendar;
/// Command implementations and argument types.
pub mod commands;
/// Versioning configuration, overrides and custom project settings.
pub mod config;
/// Resolved state for one run.
pub mod context;
/// Artifact discovery.
pub mod discovery;
/// Fatal errors and exit codes.
pub mod error;
/// Commit history.
pub mod git;
/// Mono-repo versioning.
pub mod global;
/// Stable project GUIDs.
pub mod guids;
/// Per-format version handlers.
pub mod handlers;
/// Per-project versioning pipeline.
pub mod orchestrator;
/// CI parameter lines.
pub mod output;
/// Version templates and reconciliation.
pub mod pattern;
/// Run-completion webhook.
pub mod webhook;
