//! Tangle - a dependency graph engine for developer tooling.
//!
//! This crate provides both a CLI application and a library for working with
//! directed dependency graphs:
//!
//! - **Observational graphs** (source imports, package manifests) are built
//!   from raw edges and analyzed: cycle detection with risk scoring, blast
//!   radius, impact analysis and path finding.
//! - **Constrained graphs** (task boards) reject any edge that would create a
//!   cycle and drive a dependency-gated state machine that lets independent
//!   agents claim and complete work without double-claiming.
//!
//! The [`engine::Engine`] ties both together behind the closed
//! [`protocol::Request`] / [`protocol::Response`] protocol.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod board;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod protocol;
pub mod storage;

// Public CLI module (needed by binary)
pub mod cli;

// Command implementations
pub mod commands;

// CLI output helpers
pub(crate) mod output;
