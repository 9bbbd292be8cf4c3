//! Knowledge Base module - the per-student concept graph.
//!
//! The graph consists of:
//! - **Nodes**: chapters, concepts, methods and recorded mistakes
//! - **Edges**: directed parent -> child links, kept acyclic
//! - **Records**: append-only diagnosis records with their evidence trail

mod changeset;
mod graph;
pub mod label;
mod node;
mod record;

pub use changeset::*;
pub use graph::*;
pub use node::*;
pub use record::*;
