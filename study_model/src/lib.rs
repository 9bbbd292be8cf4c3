//! # Study Model
//!
//! Domain vocabulary shared between the diagnosis pipeline and the rest of the
//! application: student and artifact identifiers, subject normalization, concept
//! node kinds, review priorities and a clock abstraction.
//! This crate holds no pipeline logic.

pub mod clock;
pub mod entities;
pub mod subjects;

pub use clock::*;
pub use entities::*;
pub use subjects::*;
