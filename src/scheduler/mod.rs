//! Builds the fixed stage sequence a physics step drives through the [`StageMachine`] (§4.2).
//!
//! The block math (§4.1) and the stage machine itself (§4.2) are kept in their own submodules;
//! this module is the glue that turns a [`ConstraintGraph`](crate::data::ConstraintGraph)'s color
//! population into the concrete list of [`SolverStage`]s for one step, including the overflow
//! color's serial "sandwiching" — every per-color stage type gets one extra, single-worker stage
//! appended for the overflow color whenever it's non-empty, so it never runs concurrently with
//! anything else.

pub mod blocks;
pub mod stage;

pub use blocks::{BlockType, SolverBlock};
pub use stage::{SolverStage, StageMachine, StageType, TERMINATE};

use blocks::plan_blocks;
use crate::config::{SolverConfig, GRAPH_COLOR_COUNT, OVERFLOW_COLOR_INDEX};

/// How many joints/contacts occupy one graph color, as produced by
/// [`crate::data::ConstraintGraph`]. Index `OVERFLOW_COLOR_INDEX` is the serial overflow color.
#[derive(Copy, Clone, Debug, Default)]
pub struct ColorCounts {
    pub joint_count: usize,
    pub contact_count: usize,
}

fn build_color_blocks(
    counts: &ColorCounts,
    worker_count: usize,
    include_joints: bool,
    include_contacts: bool,
) -> Vec<SolverBlock> {
    let mut blocks = Vec::new();
    if include_joints && counts.joint_count > 0 {
        blocks.extend(plan_blocks(counts.joint_count, worker_count, BlockType::GraphJoint));
    }
    if include_contacts && counts.contact_count > 0 {
        blocks.extend(plan_blocks(counts.contact_count, worker_count, BlockType::GraphContact));
    }
    blocks
}

#[allow(clippy::too_many_arguments)]
fn push_color_pass(
    stages: &mut Vec<SolverStage>,
    stage_type: StageType,
    active: &[usize],
    overflow_has_work: bool,
    colors: &[ColorCounts],
    worker_count: usize,
    include_joints: bool,
    include_contacts: bool,
) {
    for &color in active {
        let blocks = build_color_blocks(&colors[color], worker_count, include_joints, include_contacts);
        if !blocks.is_empty() {
            stages.push(SolverStage::new(stage_type, Some(color), blocks));
        }
    }
    if overflow_has_work {
        // The overflow color is never body-disjoint, so it always gets exactly one worker:
        // `plan_blocks(count, 1, ..)` yields a single block, which the stage machine then runs
        // serially regardless of how many workers are driving the step.
        let blocks = build_color_blocks(&colors[OVERFLOW_COLOR_INDEX], 1, include_joints, include_contacts);
        if !blocks.is_empty() {
            stages.push(SolverStage::new(stage_type, Some(OVERFLOW_COLOR_INDEX), blocks));
        }
    }
}

/// Builds the full stage-ordering pipeline for one step (§4.2):
///
/// `PrepareJoints → PrepareContacts → IntegrateVelocities → WarmStart →`
/// `Solve × velocity_iterations → IntegratePositions → Relax × relax_iterations →`
/// `Restitution → StoreImpulses`
///
/// Each `*Joints`/`*Contacts`/`WarmStart`/`Solve`/`Relax`/`Restitution`/`StoreImpulses` step
/// expands into one stage per active color plus (if non-empty) one single-worker stage for the
/// overflow color. Stages with nothing to do are omitted entirely.
pub fn build_stage_sequence(
    body_count: usize,
    colors: &[ColorCounts],
    cfg: &SolverConfig,
    worker_count: usize,
) -> Vec<SolverStage> {
    assert_eq!(colors.len(), GRAPH_COLOR_COUNT, "one count entry per graph color");
    let worker_count = worker_count.max(1);

    let active: Vec<usize> = (0..OVERFLOW_COLOR_INDEX)
        .filter(|&i| colors[i].joint_count > 0 || colors[i].contact_count > 0)
        .collect();
    let overflow_has_work =
        colors[OVERFLOW_COLOR_INDEX].joint_count > 0 || colors[OVERFLOW_COLOR_INDEX].contact_count > 0;

    let mut stages = Vec::new();

    push_color_pass(&mut stages, StageType::PrepareJoints, &active, overflow_has_work, colors, worker_count, true, false);
    push_color_pass(&mut stages, StageType::PrepareContacts, &active, overflow_has_work, colors, worker_count, false, true);

    // §4.2 stage ordering: the whole integrate/warm-start/solve/integrate-positions/relax cycle
    // repeats once per substep; only `PrepareJoints`/`PrepareContacts` (above) and
    // `Restitution`/`StoreImpulses` (below) run exactly once per step, outside the substep loop.
    for _ in 0..cfg.sub_step_count.max(1) {
        if body_count > 0 {
            stages.push(SolverStage::new(
                StageType::IntegrateVelocities,
                None,
                plan_blocks(body_count, worker_count, BlockType::Body),
            ));
        }

        push_color_pass(&mut stages, StageType::WarmStart, &active, overflow_has_work, colors, worker_count, true, true);

        for _ in 0..cfg.velocity_iterations.max(1) {
            push_color_pass(&mut stages, StageType::Solve, &active, overflow_has_work, colors, worker_count, true, true);
        }

        if body_count > 0 {
            stages.push(SolverStage::new(
                StageType::IntegratePositions,
                None,
                plan_blocks(body_count, worker_count, BlockType::Body),
            ));
        }

        for _ in 0..cfg.relax_iterations.max(1) {
            push_color_pass(&mut stages, StageType::Relax, &active, overflow_has_work, colors, worker_count, true, true);
        }
    }

    push_color_pass(&mut stages, StageType::Restitution, &active, overflow_has_work, colors, worker_count, false, true);
    push_color_pass(&mut stages, StageType::StoreImpulses, &active, overflow_has_work, colors, worker_count, false, true);

    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(joint: usize, contact: usize) -> ColorCounts {
        ColorCounts { joint_count: joint, contact_count: contact }
    }

    #[test]
    fn empty_graph_still_integrates_bodies_once_per_substep() {
        let colors = vec![ColorCounts::default(); GRAPH_COLOR_COUNT];
        let mut cfg = SolverConfig::default();
        cfg.sub_step_count = 3;
        let stages = build_stage_sequence(10, &colors, &cfg, 4);
        let types: Vec<StageType> = stages.iter().map(|s| s.stage_type).collect();
        assert_eq!(
            types,
            vec![
                StageType::IntegrateVelocities,
                StageType::IntegratePositions,
                StageType::IntegrateVelocities,
                StageType::IntegratePositions,
                StageType::IntegrateVelocities,
                StageType::IntegratePositions,
            ]
        );
    }

    #[test]
    fn zero_bodies_and_zero_constraints_yields_no_stages() {
        let colors = vec![ColorCounts::default(); GRAPH_COLOR_COUNT];
        let cfg = SolverConfig::default();
        let stages = build_stage_sequence(0, &colors, &cfg, 4);
        assert!(stages.is_empty());
    }

    #[test]
    fn active_color_stages_precede_overflow_stages_of_the_same_type() {
        let mut colors = vec![ColorCounts::default(); GRAPH_COLOR_COUNT];
        colors[0] = counts(3, 0);
        colors[OVERFLOW_COLOR_INDEX] = counts(2, 0);
        let cfg = SolverConfig::default();
        let stages = build_stage_sequence(5, &colors, &cfg, 4);

        let prepare_joint_stages: Vec<&SolverStage> = stages
            .iter()
            .filter(|s| s.stage_type == StageType::PrepareJoints)
            .collect();
        assert_eq!(prepare_joint_stages.len(), 2);
        assert_eq!(prepare_joint_stages[0].color_index, Some(0));
        assert_eq!(prepare_joint_stages[1].color_index, Some(OVERFLOW_COLOR_INDEX));
    }

    #[test]
    fn overflow_color_always_plans_with_a_single_worker() {
        let mut colors = vec![ColorCounts::default(); GRAPH_COLOR_COUNT];
        colors[OVERFLOW_COLOR_INDEX] = counts(0, 1000);
        let cfg = SolverConfig::default();
        let stages = build_stage_sequence(0, &colors, &cfg, 8);

        let overflow_prepare = stages
            .iter()
            .find(|s| s.stage_type == StageType::PrepareContacts && s.color_index == Some(OVERFLOW_COLOR_INDEX))
            .expect("overflow PrepareContacts stage");
        assert_eq!(overflow_prepare.blocks.len(), 1);
        assert_eq!(overflow_prepare.blocks[0].count, 1000);
    }

    #[test]
    fn solve_stage_repeats_once_per_configured_velocity_iteration() {
        let mut colors = vec![ColorCounts::default(); GRAPH_COLOR_COUNT];
        colors[0] = counts(1, 1);
        let mut cfg = SolverConfig::default();
        cfg.sub_step_count = 1;
        cfg.velocity_iterations = 3;
        cfg.relax_iterations = 1;
        let stages = build_stage_sequence(2, &colors, &cfg, 2);
        let solve_count = stages.iter().filter(|s| s.stage_type == StageType::Solve).count();
        assert_eq!(solve_count, 3);
    }

    #[test]
    fn restitution_and_store_impulses_run_once_regardless_of_substep_count() {
        let mut colors = vec![ColorCounts::default(); GRAPH_COLOR_COUNT];
        colors[0] = counts(0, 4);
        let mut cfg = SolverConfig::default();
        cfg.sub_step_count = 4;
        let stages = build_stage_sequence(2, &colors, &cfg, 2);
        assert_eq!(stages.iter().filter(|s| s.stage_type == StageType::Restitution).count(), 1);
        assert_eq!(stages.iter().filter(|s| s.stage_type == StageType::StoreImpulses).count(), 1);
        assert_eq!(stages.iter().filter(|s| s.stage_type == StageType::IntegrateVelocities).count(), 4);
    }
}
