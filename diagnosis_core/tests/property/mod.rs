//! Property tests for the graph and weakness invariants.

mod graph_properties;
mod weakness_properties;
