//! Diagnostic pipeline for kubectl-smart
//!
//! This crate implements the whole read-only analysis pipeline behind the
//! `diag`, `graph`, and `top` commands:
//! - a [`client::ClusterClient`] boundary to the cluster API
//! - bounded concurrent collectors
//! - tolerant parsers from raw artifacts to typed records
//! - a dependency graph over the record set
//! - a heuristic scoring engine with root-cause promotion
//! - a capacity and certificate forecaster with a persistent sample cache
//! - text and JSON renderers
//!
//! The binary crate supplies the kubectl-backed client and the CLI.

pub mod client;
pub mod collect;
pub mod config;
pub mod error;
pub mod forecast;
pub mod graph;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod scoring;
pub mod validation;

pub use config::{Config, OutputFormat};
pub use error::{ClientError, Result, SmartError};
pub use models::{DiagnosisReport, GraphReport, Severity, Subject, TopReport};
pub use pipeline::Pipeline;
