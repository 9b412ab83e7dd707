//! Narrow trait contracts for the subsystems §1 declares out of scope.
//!
//! The core solver, CCD pipeline, and sensor engine are generic over these traits rather than
//! over concrete shape/body storage, so this crate never depends on the host's broad-phase
//! tree, joint/contact math, or island bookkeeping — it only depends on the small surface area
//! listed in §6. This mirrors `rapier`'s `ComponentSet`/`ComponentSetMut` generic-bound
//! pattern in `parallel_island_solver.rs`, which lets the solver stay agnostic to how the host
//! stores rigid bodies.

use crate::aabb::Aabb;
use crate::config::SolverConfig;
use crate::data::{BodySim, BodyState};
use crate::events::ContactHitEvent;
use crate::handle::ShapeId;
use crate::math::{Real, Transform2, Vec2};

/// Indexed access to the awake solver set's body arrays (§1, "shape and body storage ...
/// provides indexed arrays of bodies, body-sims, body-states, shapes"). The container itself
/// (insertion, removal, sleeping transitions) stays external; this trait is the narrow read
/// contract the solver needs.
pub trait BodyStorage {
    fn body_count(&self) -> usize;
    fn sims(&self) -> &[BodySim];
    fn sims_mut(&mut self) -> &mut [BodySim];
    fn states(&self) -> &[BodyState];
    fn states_mut(&mut self) -> &mut [BodyState];
    /// Shape handles attached to the body at `body_index`.
    fn shapes_of(&self, body_index: usize) -> &[ShapeId];
    /// Maps a body index to its island-local index, for `awakeIslandBitSet` (§4.4 step 8).
    fn island_local_index(&self, body_index: usize) -> usize;

    /// The body a shape is attached to, for the `sameBody`/`owningBody` checks CCD (§4.5) and
    /// the sensor query (§4.6) both need.
    fn owning_body(&self, shape: ShapeId) -> usize;
    fn is_sensor(&self, shape: ShapeId) -> bool;
    fn is_shape_enabled(&self, shape: ShapeId) -> bool;
    fn collision_mask(&self, shape: ShapeId) -> u32;
    /// The shape's current broad-phase fat AABB (§4.4 step 6, §4.5).
    fn fat_aabb(&self, shape: ShapeId) -> Aabb;
    fn set_fat_aabb(&mut self, shape: ShapeId, aabb: Aabb);
    /// Recomputes a shape's tight AABB at `transform`. Shape geometry is external (§1); this is
    /// the one piece of shape math the solver/CCD/sensor pipeline cannot avoid calling.
    fn compute_aabb(&self, shape: ShapeId, transform: Transform2) -> Aabb;
}

/// A joint or contact constraint's body pair (§3.1 ADDED). `None` means a static/world anchor.
pub use crate::data::ConstraintEndpoints;

/// `PrepareJoint`, `WarmStartJoint`, `SolveJoint`, `GetJointReaction` (§1, §6.1).
pub trait JointMath {
    type Joint: ConstraintEndpoints;

    fn prepare(&mut self, joint: &mut Self::Joint, sims: &[BodySim], cfg: &SolverConfig);
    fn warm_start(&mut self, joint: &mut Self::Joint, sims: &[BodySim], states: &mut [BodyState]);
    fn solve(
        &mut self,
        joint: &mut Self::Joint,
        sims: &[BodySim],
        states: &mut [BodyState],
        use_bias: bool,
    );
    /// Returns `(reaction_force, reaction_torque)` magnitudes, used by §4.3's joint-break
    /// threshold check.
    fn get_reaction(&self, joint: &Self::Joint, inv_h: Real) -> (Real, Real);
}

/// `PrepareContact`, `WarmStartContact`, `SolveContact`, `ApplyRestitution`, `StoreImpulses`
/// (§1, §6.1). The SIMD-lane variant mentioned in §1 is treated as an implementation detail of
/// a concrete `ContactMath` (e.g. batching `Self::Contact` groups internally); the trait itself
/// stays lane-agnostic (see DESIGN.md).
pub trait ContactMath {
    type Contact: ConstraintEndpoints;

    fn prepare(&mut self, contact: &mut Self::Contact, sims: &[BodySim], cfg: &SolverConfig);
    fn warm_start(
        &mut self,
        contact: &mut Self::Contact,
        sims: &[BodySim],
        states: &mut [BodyState],
    );
    fn solve(
        &mut self,
        contact: &mut Self::Contact,
        sims: &[BodySim],
        states: &mut [BodyState],
        use_bias: bool,
    );
    fn apply_restitution(
        &mut self,
        contact: &mut Self::Contact,
        sims: &[BodySim],
        states: &mut [BodyState],
    );
    /// Stores impulses for next step's warm start and returns a hit summary if this contact
    /// newly exceeded the host's hit-reporting threshold this step.
    fn store_impulses(&mut self, contact: &mut Self::Contact) -> Option<ContactHitEvent>;
}

/// The three broad-phase trees, indexed by body type (§6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeKind {
    Static,
    Kinematic,
    Dynamic,
}

/// `Query`, `EnlargeProxy`, `BufferMove` (§1, §6).
pub trait BroadPhase {
    /// Invokes `callback` for every proxy overlapping `aabb` in `tree` whose shape's
    /// collision mask intersects `mask_bits`, stopping early if `callback` returns `false`.
    fn query(&self, tree: TreeKind, aabb: Aabb, mask_bits: u32, callback: &mut dyn FnMut(ShapeId) -> bool);
    fn enlarge_proxy(&mut self, shape: ShapeId, aabb: Aabb);
    fn buffer_move(&mut self, shape: ShapeId);
}

/// A linear sweep of a shape's placement from `(center0, rotation0)` to `(center, rotation)`
/// (§4.5, "Sweep"). Shape math is external; this is just the small value type the TOI
/// contract takes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sweep {
    pub local_center: Vec2,
    pub transform0: Transform2,
    pub transform1: Transform2,
}

impl Sweep {
    pub fn interpolate(&self, fraction: Real) -> Transform2 {
        self.transform0.lerp(&self.transform1, fraction)
    }
}

/// The outcome of a `TimeOfImpact` query (§4.5).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ToiOutput {
    /// No impact within `[0, max_fraction]`.
    Separated,
    /// Shapes are already overlapping at `fraction == 0`.
    Overlapped,
    /// First contact at `fraction`, with the contact point and normal `preSolveFcn` is given to
    /// veto the hit.
    Hit {
        fraction: Real,
        point: Vec2,
        normal: Vec2,
    },
}

/// `TimeOfImpact` (§1, §6.1).
pub trait ContinuousCollision {
    fn time_of_impact(
        &self,
        shape_a: ShapeId,
        sweep_a: &Sweep,
        shape_b: ShapeId,
        sweep_b: &Sweep,
        max_fraction: Real,
    ) -> ToiOutput;

    /// Re-runs the query against a small circle of `core_radius` centered on `shape_a`'s sweep
    /// in place of `shape_a`'s own geometry. CCD's `fraction == 0` special case (§4.5) uses this
    /// to tell a genuine initial overlap from a swept-shape false positive at the silhouette.
    fn time_of_impact_core(
        &self,
        shape_a: ShapeId,
        sweep_a: &Sweep,
        core_radius: Real,
        shape_b: ShapeId,
        sweep_b: &Sweep,
        max_fraction: Real,
    ) -> ToiOutput;
}

/// `ShapeDistance` (§1, §6.1). Used by the sensor engine's overlap test (§4.6: touching iff
/// `shape_distance < 10 * f32::EPSILON`).
pub trait ShapeDistanceQuery {
    fn shape_distance(&self, a: ShapeId, xf_a: Transform2, b: ShapeId, xf_b: Transform2) -> Real;
}

/// `SplitIslandTask`, `TrySleepIsland` (§1, §3.1 ADDED "Island wake bookkeeping").
pub trait IslandOps {
    fn split_island_task(&mut self, island_id: u32, sleep_time: Real);
    fn try_sleep_island(&mut self, island_id: u32) -> bool;
}

/// `preSolveFcn` (§6): optional veto of a CCD hit, given the hit point/normal.
pub type PreSolveFilter<'a> = dyn Fn(ShapeId, ShapeId, Vec2, Vec2) -> bool + Sync + 'a;

/// `customFilterFcn` (§6): optional veto of a candidate pair before any math runs.
pub type CustomFilter<'a> = dyn Fn(ShapeId, ShapeId) -> bool + Sync + 'a;
