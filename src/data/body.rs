//! `BodySim` and `BodyState` (§3): the dense, parallel-indexed per-body records the solver and
//! finalization stages operate on. Both live in the awake `SolverSet`, whose container
//! (insert/remove, sleeping-set transitions) is external (§1); these records are the data model
//! this crate owns and indexes directly.

use crate::math::{Real, Rot2, Transform2, Vec2};

bitflags::bitflags! {
    /// Status flags on a [`BodySim`] (§3).
    #[derive(Default)]
    pub struct BodyFlags: u8 {
        const IS_FAST            = 1 << 0;
        const IS_BULLET          = 1 << 1;
        const IS_SPEED_CAPPED    = 1 << 2;
        const HAD_TIME_OF_IMPACT = 1 << 3;
        const ENLARGE_BOUNDS     = 1 << 4;
        const ALLOW_FAST_ROTATION = 1 << 5;
        /// Per-body opt-out from sleeping (§4.4 step 3: "If sleep disabled, body opts out, ...
        /// reset sleepTime"). Independent of [`SolverConfig::enable_sleep`](crate::config::SolverConfig::enable_sleep),
        /// which is the world-wide switch.
        const SLEEP_DISABLED     = 1 << 6;
    }
}

/// Whether a body participates in the dynamics solver at all. Static/kinematic bodies have a
/// `BodySim` (so CCD and islands can reference them uniformly) but are never integrated and
/// never occupy a graph-color slot (§3.1 ADDED, "Color assignment").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    Kinematic,
    Dynamic,
}

impl BodyKind {
    pub fn is_dynamic(self) -> bool {
        matches!(self, BodyKind::Dynamic)
    }
}

/// Per-awake-body integration record (§3).
#[derive(Copy, Clone, Debug)]
pub struct BodySim {
    pub kind: BodyKind,
    /// Current center of mass, world space.
    pub center: Vec2,
    /// Current world transform (`p` is derived from `center` and `local_center`, see
    /// [`BodySim::sync_transform_from_center`]).
    pub transform: Transform2,
    /// Center of mass at the start of the step, used to build the CCD sweep (§4.5).
    pub center0: Vec2,
    pub rotation0: Rot2,
    pub inv_mass: Real,
    pub inv_inertia: Real,
    pub local_center: Vec2,
    pub min_extent: Real,
    pub max_extent: Real,
    pub force: Vec2,
    pub torque: Real,
    pub linear_damping: Real,
    pub angular_damping: Real,
    pub gravity_scale: Real,
    pub island_id: u32,
    pub flags: BodyFlags,
    pub sleep_time: Real,
}

impl BodySim {
    pub fn is_fast(&self) -> bool {
        self.flags.contains(BodyFlags::IS_FAST)
    }
    pub fn is_bullet(&self) -> bool {
        self.flags.contains(BodyFlags::IS_BULLET)
    }
    pub fn allow_fast_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::ALLOW_FAST_ROTATION)
    }
    pub fn sleep_disabled(&self) -> bool {
        self.flags.contains(BodyFlags::SLEEP_DISABLED)
    }

    /// Recomputes `transform.p` from `center` and `local_center` at the current rotation,
    /// matching the usual `center - rotate(q, local_center)` reconstruction (§4.4 step 1).
    pub fn sync_transform_from_center(&mut self) {
        self.transform.translation = self.center - self.transform.rotation * self.local_center;
    }

    /// Advances the CCD sweep baseline (`center0`/`rotation0`) to this body's current pose, so
    /// the next step's sweep and position update are built from where this step actually ended,
    /// not a stale snapshot (§4.5, "If no hit, advance center0/rotation0 to current for next
    /// step"). Must run once per step, after the final pose (including any CCD correction) is
    /// committed.
    pub fn advance_sweep_baseline(&mut self) {
        self.center0 = self.center;
        self.rotation0 = self.transform.rotation;
    }
}

/// Per-substep mutable record (§3), parallel-indexed with [`BodySim`].
#[derive(Copy, Clone, Debug, Default)]
pub struct BodyState {
    pub linear_velocity: Vec2,
    pub angular_velocity: Real,
    pub delta_position: Vec2,
    pub delta_rotation: Rot2Delta,
    pub lock_linear_x: bool,
    pub lock_linear_y: bool,
    pub lock_angular_z: bool,
}

/// `deltaRotation` accumulates as a unit-complex increment composed with `IntegrateRotation`
/// (§4.3); wrapping it distinguishes "no rotation yet" (`identity`) from a tiny-but-nonzero
/// increment without relying on float comparison.
pub type Rot2Delta = Rot2;

impl Default for Rot2Delta {
    fn default() -> Self {
        Rot2::identity()
    }
}

impl BodyState {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Zeroes the velocity components corresponding to active lock flags (§4.3, §4.4 step 1).
    pub fn apply_locks(&mut self) {
        if self.lock_linear_x {
            self.linear_velocity.x = 0.0;
        }
        if self.lock_linear_y {
            self.linear_velocity.y = 0.0;
        }
        if self.lock_angular_z {
            self.angular_velocity = 0.0;
        }
    }

    /// Resets the per-substep deltas to identity (§4.4 step 2), keeping velocities and locks.
    pub fn reset_deltas(&mut self) {
        self.delta_position = Vec2::zeros();
        self.delta_rotation = Rot2Delta::identity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_locks_zeroes_only_locked_components() {
        let mut s = BodyState {
            linear_velocity: Vec2::new(1.0, 2.0),
            angular_velocity: 3.0,
            lock_linear_x: true,
            ..BodyState::zero()
        };
        s.apply_locks();
        assert_eq!(s.linear_velocity, Vec2::new(0.0, 2.0));
        assert_eq!(s.angular_velocity, 3.0);
    }

    #[test]
    fn sync_transform_from_center_reconstructs_translation() {
        let mut sim = BodySim {
            kind: BodyKind::Dynamic,
            center: Vec2::new(1.0, 0.0),
            transform: Transform2::identity(),
            center0: Vec2::zeros(),
            rotation0: Rot2::identity(),
            inv_mass: 1.0,
            inv_inertia: 1.0,
            local_center: Vec2::new(1.0, 0.0),
            min_extent: 1.0,
            max_extent: 1.0,
            force: Vec2::zeros(),
            torque: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            island_id: 0,
            flags: BodyFlags::empty(),
            sleep_time: 0.0,
        };
        sim.sync_transform_from_center();
        assert!((sim.transform.translation - Vec2::zeros()).norm() < 1e-6);
    }
}
