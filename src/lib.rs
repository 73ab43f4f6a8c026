//! # SQL Lineage Guard Library
//!
//! Policy-gated SQL generation and table/column lineage.
//!
//! - [`parser`] turns SQL into the dialect-neutral [`ast::Statement`] tree.
//! - [`classify`] and [`policy`] decide whether a statement may run.
//! - [`pipeline`] drives the generation-validation-repair loop over a
//!   [`llm::TextGenerator`].
//! - [`lineage`] extracts column-level data flow and walks its impact.

pub mod app;
pub mod ast;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod execute;
pub mod lineage;
pub mod llm;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod policy;
pub mod preprocessor;
