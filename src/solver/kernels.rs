//! Per-substep physics kernels (§4.3): the functions a claimed [`SolverBlock`](crate::scheduler::SolverBlock)
//! dispatches into, one call per block per stage visit.

use std::ops::Range;

use crate::bitset::Bitset;
use crate::config::SolverConfig;
use crate::data::{BodyFlags, BodyKind, BodySim, BodyState};
use crate::events::JointEvent;
use crate::external::{ConstraintEndpoints, ContactMath, JointMath};
use crate::math::{integrate_rotation, Real};

/// `IntegrateVelocities` (§4.3): apply force/gravity (skipped for non-dynamic bodies), Padé
/// damping, then clamp to the configured linear/angular speed caps and zero locked components.
pub(crate) fn integrate_velocities(sims: &mut [BodySim], states: &mut [BodyState], range: Range<usize>, cfg: &SolverConfig) {
    let h = cfg.sub_dt();
    let max_angular_speed = cfg.max_angular_speed();

    for i in range {
        let sim = &mut sims[i];
        let state = &mut states[i];
        if sim.kind != BodyKind::Dynamic {
            continue;
        }

        let mut v = state.linear_velocity + (sim.force * sim.inv_mass + cfg.gravity * sim.gravity_scale) * h;
        v *= 1.0 / (1.0 + h * sim.linear_damping);
        let mut w = (state.angular_velocity + sim.torque * sim.inv_inertia * h) / (1.0 + h * sim.angular_damping);

        sim.flags.remove(BodyFlags::IS_SPEED_CAPPED);
        let speed = v.norm();
        if speed > cfg.max_linear_speed {
            v *= cfg.max_linear_speed / speed;
            sim.flags.insert(BodyFlags::IS_SPEED_CAPPED);
        }
        if !sim.allow_fast_rotation() && w.abs() > max_angular_speed {
            w = max_angular_speed.copysign(w);
            sim.flags.insert(BodyFlags::IS_SPEED_CAPPED);
        }

        state.linear_velocity = v;
        state.angular_velocity = w;
        state.apply_locks();
    }
}

/// `IntegratePositions` (§4.3): re-apply locks, then accumulate the per-substep pose delta.
pub(crate) fn integrate_positions(sims: &[BodySim], states: &mut [BodyState], range: Range<usize>, cfg: &SolverConfig) {
    let h = cfg.sub_dt();
    for i in range {
        if sims[i].kind == BodyKind::Static {
            continue;
        }
        let state = &mut states[i];
        state.apply_locks();
        state.delta_position += state.linear_velocity * h;
        state.delta_rotation = integrate_rotation(state.delta_rotation, h * state.angular_velocity);
    }
}

pub(crate) fn prepare_joints<JM: JointMath>(
    joint_math: &mut JM,
    joints: &mut [JM::Joint],
    range: Range<usize>,
    sims: &[BodySim],
    cfg: &SolverConfig,
) {
    for joint in &mut joints[range] {
        joint_math.prepare(joint, sims, cfg);
    }
}

pub(crate) fn prepare_contacts<CM: ContactMath>(
    contact_math: &mut CM,
    contacts: &mut [CM::Contact],
    range: Range<usize>,
    sims: &[BodySim],
    cfg: &SolverConfig,
) {
    for contact in &mut contacts[range] {
        contact_math.prepare(contact, sims, cfg);
    }
}

pub(crate) fn warm_start_joints<JM: JointMath>(
    joint_math: &mut JM,
    joints: &mut [JM::Joint],
    range: Range<usize>,
    sims: &[BodySim],
    states: &mut [BodyState],
) {
    for joint in &mut joints[range] {
        joint_math.warm_start(joint, sims, states);
    }
}

pub(crate) fn warm_start_contacts<CM: ContactMath>(
    contact_math: &mut CM,
    contacts: &mut [CM::Contact],
    range: Range<usize>,
    sims: &[BodySim],
    states: &mut [BodyState],
) {
    for contact in &mut contacts[range] {
        contact_math.warm_start(contact, sims, states);
    }
}

/// `Solve`/`Relax` for joints (§4.3). When `use_bias` (the `Solve` pass, never `Relax`), also
/// maintains `jointStateBitSet`: the first substep a joint's reaction exceeds its configured
/// threshold sets its bit and emits the one `JointEvent` for this step; later substeps
/// short-circuit once the bit is already set.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve_joints<JM: JointMath>(
    joint_math: &mut JM,
    joints: &mut [JM::Joint],
    range: Range<usize>,
    sims: &[BodySim],
    states: &mut [BodyState],
    use_bias: bool,
    inv_h: Real,
    cfg: &SolverConfig,
    joint_state_bitset: &mut Bitset,
    joint_events: &mut Vec<JointEvent>,
) {
    for joint in &mut joints[range] {
        joint_math.solve(joint, sims, states, use_bias);
        if !use_bias {
            continue;
        }
        let id = joint.id() as usize;
        if joint_state_bitset.get(id) {
            continue;
        }
        if cfg.joint_force_threshold.is_finite() || cfg.joint_torque_threshold.is_finite() {
            let (force, torque) = joint_math.get_reaction(joint, inv_h);
            if force.abs() > cfg.joint_force_threshold || torque.abs() > cfg.joint_torque_threshold {
                joint_state_bitset.set(id);
                joint_events.push(JointEvent {
                    joint_index: id as u32,
                    reaction_force: force,
                    reaction_torque: torque,
                });
            }
        }
    }
}

pub(crate) fn solve_contacts<CM: ContactMath>(
    contact_math: &mut CM,
    contacts: &mut [CM::Contact],
    range: Range<usize>,
    sims: &[BodySim],
    states: &mut [BodyState],
    use_bias: bool,
) {
    for contact in &mut contacts[range] {
        contact_math.solve(contact, sims, states, use_bias);
    }
}

pub(crate) fn apply_restitution<CM: ContactMath>(
    contact_math: &mut CM,
    contacts: &mut [CM::Contact],
    range: Range<usize>,
    sims: &[BodySim],
    states: &mut [BodyState],
) {
    for contact in &mut contacts[range] {
        contact_math.apply_restitution(contact, sims, states);
    }
}

pub(crate) fn store_impulses<CM: ContactMath>(
    contact_math: &mut CM,
    contacts: &mut [CM::Contact],
    range: Range<usize>,
    hits: &mut Vec<crate::events::ContactHitEvent>,
) {
    for contact in &mut contacts[range] {
        if let Some(hit) = contact_math.store_impulses(contact) {
            hits.push(hit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BodyFlags, BodyKind};
    use crate::math::{Rot2, Transform2, Vec2};

    fn dynamic_body() -> BodySim {
        BodySim {
            kind: BodyKind::Dynamic,
            center: Vec2::zeros(),
            transform: Transform2::identity(),
            center0: Vec2::zeros(),
            rotation0: Rot2::identity(),
            inv_mass: 1.0,
            inv_inertia: 1.0,
            local_center: Vec2::zeros(),
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
        }
    }

    #[test]
    fn integrate_velocities_applies_gravity_scaled_by_body() {
        let mut sims = vec![dynamic_body()];
        sims[0].gravity_scale = 2.0;
        let mut states = vec![BodyState::zero()];
        let cfg = SolverConfig {
            gravity: Vec2::new(0.0, -10.0),
            sub_step_count: 1,
            dt: 1.0,
            ..SolverConfig::default()
        };
        integrate_velocities(&mut sims, &mut states, 0..1, &cfg);
        assert!((states[0].linear_velocity.y - (-20.0)).abs() < 1e-4);
    }

    #[test]
    fn integrate_velocities_skips_non_dynamic_bodies() {
        let mut sims = vec![dynamic_body()];
        sims[0].kind = BodyKind::Kinematic;
        let mut states = vec![BodyState {
            linear_velocity: Vec2::new(3.0, 0.0),
            ..BodyState::zero()
        }];
        let cfg = SolverConfig::default();
        integrate_velocities(&mut sims, &mut states, 0..1, &cfg);
        assert_eq!(states[0].linear_velocity, Vec2::new(3.0, 0.0));
    }

    #[test]
    fn integrate_velocities_clamps_to_max_linear_speed_and_sets_flag() {
        let mut sims = vec![dynamic_body()];
        let mut states = vec![BodyState {
            linear_velocity: Vec2::new(1000.0, 0.0),
            ..BodyState::zero()
        }];
        let cfg = SolverConfig {
            gravity: Vec2::zeros(),
            max_linear_speed: 50.0,
            ..SolverConfig::default()
        };
        integrate_velocities(&mut sims, &mut states, 0..1, &cfg);
        assert!((states[0].linear_velocity.norm() - 50.0).abs() < 1e-3);
        assert!(sims[0].flags.contains(BodyFlags::IS_SPEED_CAPPED));
    }

    #[test]
    fn integrate_positions_accumulates_delta_position() {
        let sims = vec![dynamic_body()];
        let mut states = vec![BodyState {
            linear_velocity: Vec2::new(2.0, 0.0),
            ..BodyState::zero()
        }];
        let cfg = SolverConfig {
            dt: 1.0,
            sub_step_count: 1,
            ..SolverConfig::default()
        };
        integrate_positions(&sims, &mut states, 0..1, &cfg);
        assert_eq!(states[0].delta_position, Vec2::new(2.0, 0.0));
    }

    #[test]
    fn integrate_positions_skips_static_bodies() {
        let mut sims = vec![dynamic_body()];
        sims[0].kind = BodyKind::Static;
        let mut states = vec![BodyState {
            linear_velocity: Vec2::new(2.0, 0.0),
            ..BodyState::zero()
        }];
        let cfg = SolverConfig::default();
        integrate_positions(&sims, &mut states, 0..1, &cfg);
        assert_eq!(states[0].delta_position, Vec2::zeros());
    }
}
