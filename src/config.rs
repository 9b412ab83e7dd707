//! Tuning parameters for a [`Solve`](crate::solver::solve) call.
//!
//! Mirrors `rapier`'s `IntegrationParameters`: a plain data struct with sane defaults,
//! constructed once per world and passed by reference into the hot path.

use crate::math::{Real, Vec2};

/// Per-step tuning knobs consumed by the solver, CCD, and finalization stages.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolverConfig {
    /// Time covered by a single `Solve` call, in seconds. `0.0` is legal (see §8 property 6)
    /// and must produce no visible motion.
    pub dt: Real,
    /// Constant world acceleration applied to every dynamic body's velocity integration,
    /// scaled per body by `BodySim::gravity_scale`.
    pub gravity: Vec2,
    /// Number of substeps `Solve` subdivides `dt` into.
    pub sub_step_count: u32,
    /// Bias-enabled solver iterations per substep (the `Solve(useBias=true)` loop).
    pub velocity_iterations: u32,
    /// Bias-disabled relaxation iterations per substep (the `Relax(useBias=false)` loop).
    pub relax_iterations: u32,
    /// AABB inflation used to catch near-misses on the next step.
    pub speculative_distance: Real,
    /// Additional AABB margin applied when a shape's AABB escapes its fat AABB.
    pub aabb_margin: Real,
    /// Hard cap on linear speed after velocity integration.
    pub max_linear_speed: Real,
    /// Hard cap on rotation per step; `max_angular_speed = max_rotation / dt`.
    pub max_rotation: Real,
    /// Below this combined linear+angular "sleep velocity" a body accumulates sleep time.
    pub sleep_threshold: Real,
    /// Accumulated sleep time required before a body's island may sleep.
    pub time_to_sleep: Real,
    /// Whether continuous collision is enabled at all.
    pub enable_continuous: bool,
    /// World-wide switch for sleeping (§4.4 step 3, "If sleep disabled ... reset sleepTime").
    /// `false` pins every dynamic body's `sleep_time` at `0.0` regardless of its sleep velocity.
    pub enable_sleep: bool,
    /// Whether sensor begin/end events are emitted.
    pub enable_sensor_events: bool,
    /// `JointEvent` trips when a joint's reaction force magnitude exceeds this. `Real::INFINITY`
    /// (the default) disables force-triggered joint events entirely (§4.3, "when useBias and
    /// thresholds are finite").
    pub joint_force_threshold: Real,
    /// As [`Self::joint_force_threshold`], for reaction torque magnitude.
    pub joint_torque_threshold: Real,
}

/// Per §9 ("Resolved — sensor-hit capacity of 8"): a hard, documented per-step-per-body budget,
/// not a tuning knob, so it is a constant rather than a `SolverConfig` field.
pub const MAX_SENSOR_HITS_PER_BODY: usize = 8;

/// Fast bodies are swept against the static tree unconditionally; bullets additionally sweep
/// against the kinematic and dynamic trees (§4.5).
pub const CORE_FRACTION: Real = 0.25;

/// Default, fixed palette size for the constraint graph: 11 regular colors plus one overflow
/// color, matching the Box2D-family default this spec's stage ordering is modeled on (§9).
pub const GRAPH_COLOR_COUNT: usize = 12;
pub const OVERFLOW_COLOR_INDEX: usize = GRAPH_COLOR_COUNT - 1;

/// `ShapeDistance < 10 * f32::EPSILON` is the touching threshold used by the sensor query (§4.6).
pub const SENSOR_TOUCH_EPSILON_SCALE: Real = 10.0;

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            gravity: Vec2::new(0.0, -9.81),
            sub_step_count: 4,
            velocity_iterations: 4,
            relax_iterations: 2,
            speculative_distance: 0.02,
            aabb_margin: 0.1,
            max_linear_speed: 400.0,
            max_rotation: 0.25 * std::f32::consts::PI,
            sleep_threshold: 0.05,
            time_to_sleep: 0.5,
            enable_continuous: true,
            enable_sleep: true,
            enable_sensor_events: true,
            joint_force_threshold: Real::INFINITY,
            joint_torque_threshold: Real::INFINITY,
        }
    }
}

impl SolverConfig {
    /// Time covered by a single substep.
    pub fn sub_dt(&self) -> Real {
        if self.sub_step_count == 0 {
            0.0
        } else {
            self.dt / self.sub_step_count as Real
        }
    }

    /// Inverse of `dt`, `0.0` when `dt == 0.0` (matches the `inv` helper in
    /// `utils.rs`, which returns `0` instead of dividing by zero).
    pub fn inv_dt(&self) -> Real {
        crate::utils::inv(self.dt)
    }

    /// `max_rotation / dt`, the angular speed cap used by `IntegrateVelocities` (§4.3).
    /// Returns `Real::MAX` when `dt == 0.0` so a zero-length step never spuriously clamps.
    pub fn max_angular_speed(&self) -> Real {
        if self.dt == 0.0 {
            Real::MAX
        } else {
            self.max_rotation / self.dt
        }
    }

    pub fn validate(&self) {
        debug_assert!(self.dt >= 0.0, "dt must be non-negative");
        debug_assert!(
            self.sub_step_count > 0 || self.dt == 0.0,
            "sub_step_count must be positive for a non-zero step"
        );
        debug_assert!(self.speculative_distance >= 0.0);
        debug_assert!(self.aabb_margin >= 0.0);
    }
}
