//! # Registrar
//!
//! A metadata-driven query compiler for institutional reporting.
//!
//! ## Architecture
//!
//! Reports are described as dependency graphs in a metadata store, never as
//! SQL text:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Metadata Store (reports, graphs)            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [load + integrity check]
//! ┌─────────────────────────────────────────────────────────┐
//! │               ReportGraph (immutable snapshot)           │
//! │          + Validation (catalog reconciliation)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Parameterized SQL ($n placeholders only)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [scoped executor]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Verified-scope execution + post-fetch masking        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The lineage index sits beside this pipeline and answers impact questions
//! over the same stored graphs.

pub mod catalog;
pub mod compile;
pub mod config;
pub mod exec;
pub mod lineage;
pub mod model;
pub mod sql;
pub mod store;
pub mod validation;

pub use compile::{compile, compile_report, CompileError, CompiledQuery, OutputColumn};
pub use model::{ReportGraph, ReportId};
pub use store::{MetadataStore, StoreError};
