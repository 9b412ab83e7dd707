//! The solver's owned data model (§3): body records and the constraint graph.
//!
//! Shape/body *storage* (the container managing insertion, removal, and sleeping-set
//! transitions) is external per §1 — see [`crate::external::BodyStorage`]. What lives here are
//! the dense per-body records the storage container is expected to hand the solver indexed
//! access to.

pub mod body;
pub mod graph_color;

pub use body::{BodyFlags, BodyKind, BodySim, BodyState};
pub use graph_color::{ConstraintEndpoints, ConstraintGraph, GraphColor};
