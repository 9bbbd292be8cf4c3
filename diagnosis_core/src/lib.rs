//! # Diagnosis Core
//!
//! Turns analyzed student artifacts (class notes, error-book entries) into a
//! per-student concept graph with weakness scores and a review schedule.
//!
//! ## Pipeline
//!
//! - **extractor**: normalizes raw model analysis into a [`DiagnosisRecord`]
//! - **resolver**: maps mistake labels onto deduplicated [`ConceptNode`]s without cycles
//! - **weakness**: increments scores and propagates a damped signal to ancestors
//! - **scheduler**: derives review priorities and next-review times
//! - **assembler**: read-only subgraph views for the mind-map layer
//!
//! The [`service`] module wires these together behind per-student locks and a
//! transactional [`store`].

pub mod assembler;
pub mod config;
pub mod error;
pub mod extractor;
pub mod knowledge_base;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod weakness;

pub use assembler::*;
pub use config::*;
pub use error::*;
pub use extractor::*;
pub use knowledge_base::*;
pub use resolver::*;
pub use scheduler::*;
pub use service::*;
pub use store::*;
pub use weakness::*;
