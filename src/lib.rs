//! A staged, work-stealing parallel constraint solver for a 2D rigid-body physics simulator,
//! plus the continuous-collision sweep pipeline and sensor overlap engine it drives alongside.
//!
//! This crate owns the hot loop — graph-coloring, lock-free block scheduling, the stage machine,
//! substep kernels, time-of-impact sweeps, and deterministic sensor touch events — and nothing
//! else: shape storage, broad-phase trees, joint/contact math, and island bookkeeping are all
//! expressed as traits in [`external`] and supplied by the host. See that module for the full
//! contract a host needs to implement to drive [`solver::solve`].
//!
//! ```ignore
//! let events = rapier2d_solver_core::solver::solve(
//!     &mut storage, &mut joint_math, &mut contact_math, &mut graph,
//!     &mut broad_phase, &ccd_query, &shape_distance, &mut island_ops,
//!     &mut sensors, &hooks, &cfg, worker_count, &queue, &mut scratch,
//! );
//! ```

pub mod aabb;
pub mod arena;
pub mod bitset;
pub mod ccd;
pub mod config;
pub mod data;
pub mod events;
pub mod external;
pub mod handle;
pub mod math;
pub mod scheduler;
pub mod sensor;
pub mod solver;
pub mod task_queue;
mod utils;

pub use aabb::Aabb;
pub use config::SolverConfig;
pub use events::StepEvents;
pub use handle::{Handle, ShapeId};
pub use solver::{solve, StepHooks, TaskContext};
