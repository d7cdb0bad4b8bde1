//! Template provisioning engine.
//!
//! Applies portable templates (JSON documents of per-category entries with
//! `{token}` placeholders) to a live target, and extracts templates back
//! from a target with its concrete values turned into tokens again.
//!
//! The public API is organised into layers, leaves first:
//!
//! - **[`tokens`]**: the token registry, scopes and the substitution engine
//! - **[`template`]**: the template document and extraction delta cleanup
//! - **[`target`]**: the live resource a run reads and writes
//! - **[`resources`]**: idempotent `check + apply` primitives over entries
//! - **[`handlers`]**: one handler per resource category, in dependency order
//! - **[`pipeline`]**: the orchestrator: ordering, progress, notifications, faults
//! - **[`commands`]**: top-level subcommand orchestration (`apply`, `extract`, `validate`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod pipeline;
pub mod resources;
pub mod target;
pub mod template;
pub mod tokens;
