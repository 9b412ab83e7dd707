//! Step output events (§3.1 ADDED, §5 "Event arrays are append-mostly").
//!
//! `body_move_events` is written race-free by sim index during the parallel phase;
//! `joint_events`, `contact_hit_events`, `sensor_begin_events`, and `sensor_end_events` are only
//! ever written by the serial post-step phase (§5), so they are plain `Vec`s with no
//! synchronization.

use crate::handle::ShapeId;
use crate::math::{Real, Transform2, Vec2};

/// Emitted once per awake body per step during finalization, and possibly overwritten by CCD
/// (§4.4 step 7, §4.5) when the body's pose is corrected to the TOI fraction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BodyMoveEvent {
    pub sim_index: u32,
    pub transform: Transform2,
    pub fell_asleep: bool,
}

/// Emitted once per joint whose `jointStateBitSet` bit was set this step (§4.3).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JointEvent {
    pub joint_index: u32,
    pub reaction_force: Real,
    pub reaction_torque: Real,
}

/// A narrow pass-through of the information contact math exposes via `StoreImpulses`
/// (§3.1 ADDED). Contact math itself stays external; the core only transports this summary.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactHitEvent {
    pub shape_a: ShapeId,
    pub shape_b: ShapeId,
    pub point: Vec2,
    pub normal: Vec2,
    pub approach_speed: Real,
}

/// Emitted by the serial sensor event phase (§4.6).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorBeginTouchEvent {
    pub sensor_shape: ShapeId,
    pub visitor_shape: ShapeId,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorEndTouchEvent {
    pub sensor_shape: ShapeId,
    pub visitor_shape: ShapeId,
}

/// All events produced by one [`Solve`](crate::solver::solve) call.
#[derive(Clone, Debug, Default)]
pub struct StepEvents {
    pub body_move_events: Vec<BodyMoveEvent>,
    pub joint_events: Vec<JointEvent>,
    pub contact_hit_events: Vec<ContactHitEvent>,
    pub sensor_begin_events: Vec<SensorBeginTouchEvent>,
    pub sensor_end_events: Vec<SensorEndTouchEvent>,
}

impl StepEvents {
    pub fn clear(&mut self) {
        self.body_move_events.clear();
        self.joint_events.clear();
        self.contact_hit_events.clear();
        self.sensor_begin_events.clear();
        self.sensor_end_events.clear();
    }
}
