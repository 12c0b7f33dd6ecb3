//! Shared test utilities for inbox-cleaner integration tests.
//!
//! This module provides:
//! - `ScriptedProvider`, a `MailProvider` that replays queued pages
//! - `StaticTokenSource` for toggling credential availability
//! - Builders for pages, metadata and app state

#![allow(dead_code)]

pub mod builders;
pub mod scripted;

pub use builders::*;
pub use scripted::{ListCall, ScriptedProvider, StaticTokenSource};
