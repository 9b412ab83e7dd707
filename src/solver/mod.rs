//! Top-level step orchestration (§4.4): drives the graph-colored stage machine across
//! `worker_count` workers, then finalizes every body (pose reconstruction, inline non-bullet
//! CCD, bullet collection, AABB refresh, sleep bookkeeping), then serially resolves sensor
//! events and hands back everything the step produced.
//!
//! This module is the one place in the crate that reaches for [`racy::RacyMut`]: every other
//! module only ever sees disjoint slices, but `solve` is where "disjoint by construction" has
//! to be turned into "disjoint to the borrow checker", because the block scheduler's safety
//! argument (§3 invariants 2 and 3) lives at the index level, not the type level. Every array
//! the parallel phases touch is wrapped on its own, once, right before the phase that needs
//! it — never derived from a second live borrow of the same owner — so no two of these wrappers
//! are ever reborrows of one another.

mod kernels;
mod racy;

use rustc_hash::FxHashSet;

use crate::bitset::Bitset;
use crate::ccd::{self, CcdHooks};
use crate::config::SolverConfig;
use crate::data::{BodyFlags, BodyKind, BodySim, BodyState, ConstraintGraph, GraphColor};
use crate::events::{BodyMoveEvent, ContactHitEvent, JointEvent, StepEvents};
use crate::external::{
    BodyStorage, BroadPhase, ContactMath, ContinuousCollision, CustomFilter, IslandOps, JointMath,
    ShapeDistanceQuery, Sweep,
};
use crate::handle::ShapeId;
use crate::math::Transform2;
use crate::scheduler::{build_stage_sequence, BlockType, ColorCounts, SolverBlock, SolverStage, StageMachine, StageType};
use crate::sensor::{self, Sensor, SensorHit};
use crate::task_queue::TaskQueue;
use racy::RacyMut;

/// Per-worker scratch for one `solve` call (§9, "Per-worker scratch + final OR-reduce").
///
/// Every field here is written only by the worker it's indexed to during the parallel phases;
/// [`solve`] merges all `worker_count` instances into the returned [`StepEvents`] and the
/// caller-visible bitsets serially, after every worker has rejoined.
#[derive(Default)]
pub struct TaskContext {
    /// Joints this worker pushed past their reaction threshold this step (§4.3).
    pub joint_state_bitset: Bitset,
    /// Shapes this worker's bodies enlarged past their fat AABB (§4.4 step 6), indexed by
    /// `ShapeId::raw_index`.
    pub enlarged_sim_bitset: Bitset,
    /// Islands this worker touched at least one awake body of (§3.1 ADDED).
    pub awake_island_bitset: Bitset,
    pub joint_events: Vec<JointEvent>,
    pub contact_hits: Vec<ContactHitEvent>,
    /// Sensor hits discovered mid-sweep by this worker's bodies' CCD passes (§4.5), absorbed
    /// into the owning [`Sensor`]'s scratch buffer during the serial sensor phase.
    pub sensor_hits: Vec<SensorHit>,
    pub dropped_sensor_hits: u32,
    /// Bullet bodies this worker finalized, deferred to the serial, id-sorted bullet pass
    /// (§4.5, §9 "bullet CCD order").
    pub bullet_bodies: Vec<usize>,
    /// This worker's best candidate for `SplitIslandTask` (§9): the awake dynamic body with the
    /// highest sleep time that hasn't yet reached `time_to_sleep`, used as a per-worker-local
    /// proxy for "island closest to sleeping" since this crate does not itself maintain island
    /// membership (§1) and so cannot compute a true per-island minimum here.
    pub split_island_id: Option<u32>,
    pub split_sleep_time: f32,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.joint_state_bitset.clear();
        self.enlarged_sim_bitset.clear();
        self.awake_island_bitset.clear();
        self.joint_events.clear();
        self.contact_hits.clear();
        self.sensor_hits.clear();
        self.dropped_sensor_hits = 0;
        self.bullet_bodies.clear();
        self.split_island_id = None;
        self.split_sleep_time = 0.0;
    }
}

/// Closures `solve` needs that this crate cannot derive from [`BodyStorage`] alone: pair
/// exclusion tables, shape-type-specific checks, and the visitor→sensor-slot lookup. Bundled
/// the way [`CcdHooks`] bundles per-candidate predicates, since every field here is a host
/// policy decision rather than solver-owned data.
pub struct StepHooks<'a> {
    pub ccd: CcdHooks<'a>,
    /// Maps a sensor's [`ShapeId`] to its index in the `sensors` slice passed to [`solve`].
    pub sensor_index_of: &'a (dyn Fn(ShapeId) -> Option<usize> + Sync),
    pub transform_of: &'a (dyn Fn(ShapeId) -> Transform2 + Sync),
    pub sensor_enabled_on: &'a (dyn Fn(ShapeId) -> bool + Sync),
    pub collision_filter: &'a (dyn Fn(ShapeId, ShapeId) -> bool + Sync),
    pub sensor_custom_filter: Option<&'a CustomFilter<'a>>,
}

/// Runs one physics step (§4.2–§4.6): builds the stage sequence from `graph`'s current color
/// population, drives it to completion across `worker_count` workers via `queue`, finalizes
/// every body, resolves sensor overlaps, and returns everything observable this step.
///
/// `scratch` must have at least `worker_count` entries; each is [`TaskContext::clear`]ed on
/// entry so the caller can reuse the same buffer across steps.
#[allow(clippy::too_many_arguments)]
pub fn solve<S, JM, CM, BP, CC, SD, IO, TQ>(
    storage: &mut S,
    joint_math: &mut JM,
    contact_math: &mut CM,
    graph: &mut ConstraintGraph<JM::Joint, CM::Contact>,
    broad_phase: &mut BP,
    ccd_query: &CC,
    shape_distance: &SD,
    island_ops: &mut IO,
    sensors: &mut [Sensor],
    hooks: &StepHooks<'_>,
    cfg: &SolverConfig,
    worker_count: usize,
    queue: &TQ,
    scratch: &mut [TaskContext],
) -> StepEvents
where
    S: BodyStorage,
    JM: JointMath,
    CM: ContactMath,
    BP: BroadPhase,
    CC: ContinuousCollision + Sync,
    SD: ShapeDistanceQuery + Sync,
    IO: IslandOps,
    TQ: TaskQueue,
{
    cfg.validate();
    let worker_count = worker_count.max(1);
    assert!(scratch.len() >= worker_count, "scratch must cover every worker");
    for ctx in scratch.iter_mut().take(worker_count) {
        ctx.clear();
    }

    let body_count = storage.body_count();
    // Per-step scratch (color counts, the body-move event array below) is carved out of one
    // arena scope for the whole call and released in reverse order, per §5's allocation
    // discipline; the arena itself still defers to the global allocator.
    let mut arena = crate::arena::Arena::new();
    let colors_frame = arena.begin_frame();
    let raw_colors = graph.colors();
    let colors: Vec<ColorCounts> = arena.alloc_vec_with(raw_colors.len(), |i| ColorCounts {
        joint_count: raw_colors[i].joints.len(),
        contact_count: raw_colors[i].contacts.len(),
    });
    let stages = build_stage_sequence(body_count, &colors, cfg, worker_count);
    let machine = StageMachine::new(stages);
    let inv_h = crate::utils::inv(cfg.sub_dt());

    // Safety: every block within one stage addresses a body- or constraint-disjoint index
    // range (§3 invariants 2–3, enforced by `StageMachine::run_worker`'s CAS claim); no two
    // concurrently-executing blocks ever dereference the same element through these pointers.
    // Each wrapper below is built directly from its owner and never lives alongside a second
    // live borrow of that same owner, so constructing them does not itself conflict.
    let sims_racy = RacyMut::new(storage.sims_mut());
    let states_racy = RacyMut::new(storage.states_mut());
    let joint_math_racy = RacyMut::new(joint_math);
    let contact_math_racy = RacyMut::new(contact_math);
    let colors_racy = RacyMut::new(graph.colors_mut());
    let scratch_racy = RacyMut::new(scratch);

    queue.finish(queue.enqueue(worker_count, 1, &|start, end, _tidx| {
        let _flush_guard = crate::utils::FlushToZeroDenormalsAreZeroFlags::flush_denormal_to_zero();
        for worker_index in start..end {
            let ok = machine.run_worker(worker_index, worker_count, |stage, block| {
                dispatch_block(
                    stage,
                    block,
                    worker_index,
                    &sims_racy,
                    &states_racy,
                    &joint_math_racy,
                    &contact_math_racy,
                    &colors_racy,
                    &scratch_racy,
                    cfg,
                    inv_h,
                );
            });
            debug_assert!(ok, "stage machine aborted mid-step");
        }
    }));

    let body_move_frame = arena.begin_frame();
    let mut body_move_events: Vec<BodyMoveEvent> = arena.alloc_vec_with(body_count, |_| BodyMoveEvent {
        sim_index: 0,
        transform: Transform2::identity(),
        fell_asleep: false,
    });

    // The colored-stage dispatch above is done with `storage`; re-wrap the whole thing (plus
    // the broad-phase, which body finalization also mutates) for the body-parallel phase.
    let storage_racy = RacyMut::new(storage);
    let broad_phase_racy = RacyMut::new(broad_phase);
    let body_move_racy = RacyMut::new(body_move_events.as_mut_slice());

    queue.finish(queue.enqueue(worker_count, 1, &|start, end, _tidx| {
        let _flush_guard = crate::utils::FlushToZeroDenormalsAreZeroFlags::flush_denormal_to_zero();
        for worker_index in start..end {
            let lo = (worker_index * body_count) / worker_count;
            let hi = ((worker_index + 1) * body_count) / worker_count;
            for body_index in lo..hi {
                finalize_body(
                    body_index,
                    &storage_racy,
                    &broad_phase_racy,
                    ccd_query,
                    &hooks.ccd,
                    hooks.sensor_index_of,
                    cfg,
                    unsafe { &mut scratch_racy.get()[worker_index] },
                    &body_move_racy,
                );
            }
        }
    }));

    // Bullets resolve CCD only after every non-bullet fast body has already committed its own
    // pose: two bullets never interact (§4.5), but a bullet can still be stopped by a
    // non-bullet's already-finalized pose, so bullets must run strictly after, and serially, in
    // a fixed order so the result never depends on which worker finalized which body first
    // (§9 "bullet CCD order").
    let mut bullet_bodies: Vec<usize> = scratch
        .iter()
        .take(worker_count)
        .flat_map(|c| c.bullet_bodies.iter().copied())
        .collect();
    bullet_bodies.sort_unstable();
    {
        let storage = unsafe { storage_racy.get() };
        let broad_phase = unsafe { broad_phase_racy.get() };
        for body_index in bullet_bodies {
            let sim_snapshot = storage.sims()[body_index];
            run_inline_ccd(
                &sim_snapshot,
                body_index,
                storage,
                broad_phase,
                ccd_query,
                &hooks.ccd,
                hooks.sensor_index_of,
                cfg,
                &mut scratch[0],
            );
            storage.sims_mut()[body_index].advance_sweep_baseline();
            body_move_events[body_index].transform = storage.sims()[body_index].transform;
        }
    }

    let mut events = StepEvents::default();
    events.body_move_events = body_move_events;

    // Serial merges and the sensor phase (§4.6): cheap relative to the parallel phases above,
    // and sensor event emission must be deterministic regardless of worker count.
    let mut awake_island_bitset = Bitset::new();
    let mut best_split: Option<(u32, f32)> = None;
    for ctx in scratch.iter_mut().take(worker_count) {
        awake_island_bitset.union_with(&ctx.awake_island_bitset);
        events.joint_events.append(&mut ctx.joint_events);
        events.contact_hit_events.append(&mut ctx.contact_hits);
        for hit in ctx.sensor_hits.drain(..) {
            sensors[hit.sensor_index].push_hit(hit.visitor);
        }
        if let Some(id) = ctx.split_island_id {
            let better = match best_split {
                Some((best_id, best_time)) => {
                    ctx.split_sleep_time > best_time || (ctx.split_sleep_time == best_time && id < best_id)
                }
                None => true,
            };
            if better {
                best_split = Some((id, ctx.split_sleep_time));
            }
        }
    }

    let storage = unsafe { storage_racy.get() };
    let broad_phase = unsafe { broad_phase_racy.get() };
    for sensor in sensors.iter_mut() {
        let changed = sensor::query_sensor(
            sensor,
            broad_phase,
            shape_distance,
            hooks.transform_of,
            &|a, b| (hooks.ccd.same_body)(a, b),
            hooks.sensor_enabled_on,
            hooks.collision_filter,
            hooks.sensor_custom_filter,
        );
        if changed {
            sensor::emit_events(sensor.shape, sensor.overlaps(), sensor.pending_overlaps(), &mut events);
        }
    }

    let mut slept_islands = FxHashSet::default();
    for island_id in awake_island_bitset.iter_ones() {
        if island_ops.try_sleep_island(island_id as u32) {
            slept_islands.insert(island_id as u32);
        }
    }
    if let Some((island_id, sleep_time)) = best_split {
        island_ops.split_island_task(island_id, sleep_time);
    }
    if !slept_islands.is_empty() {
        for (body_index, event) in events.body_move_events.iter_mut().enumerate() {
            if slept_islands.contains(&storage.sims()[body_index].island_id) {
                event.fell_asleep = true;
            }
        }
    }

    arena.end_frame(body_move_frame);
    arena.end_frame(colors_frame);

    events
}

/// Dispatches one claimed block to the per-substep kernel matching its stage (§4.3).
#[allow(clippy::too_many_arguments)]
fn dispatch_block<JM, CM>(
    stage: &SolverStage,
    block: &SolverBlock,
    worker_index: usize,
    sims: &RacyMut<[BodySim]>,
    states: &RacyMut<[BodyState]>,
    joint_math: &RacyMut<JM>,
    contact_math: &RacyMut<CM>,
    colors: &RacyMut<[GraphColor<JM::Joint, CM::Contact>]>,
    scratch: &RacyMut<[TaskContext]>,
    cfg: &SolverConfig,
    inv_h: f32,
) where
    JM: JointMath,
    CM: ContactMath,
{
    let range = block.start_index as usize..block.end_index() as usize;
    let color_index = || stage.color_index.expect("color-scoped stage");
    // Safety: see the comment at the `solve` call site that constructs these `RacyMut`s.
    let ctx = unsafe { &mut scratch.get()[worker_index] };

    match stage.stage_type {
        StageType::IntegrateVelocities => {
            kernels::integrate_velocities(unsafe { sims.get() }, unsafe { states.get() }, range, cfg)
        }
        StageType::IntegratePositions => {
            kernels::integrate_positions(unsafe { sims.get() }, unsafe { states.get() }, range, cfg)
        }
        StageType::PrepareJoints => {
            let color = &mut unsafe { colors.get() }[color_index()];
            kernels::prepare_joints(unsafe { joint_math.get() }, &mut color.joints, range, unsafe { sims.get() }, cfg)
        }
        StageType::PrepareContacts => {
            let color = &mut unsafe { colors.get() }[color_index()];
            kernels::prepare_contacts(unsafe { contact_math.get() }, &mut color.contacts, range, unsafe { sims.get() }, cfg)
        }
        StageType::WarmStart => {
            let color = &mut unsafe { colors.get() }[color_index()];
            match block.block_type {
                BlockType::GraphJoint => kernels::warm_start_joints(
                    unsafe { joint_math.get() },
                    &mut color.joints,
                    range,
                    unsafe { sims.get() },
                    unsafe { states.get() },
                ),
                BlockType::GraphContact => kernels::warm_start_contacts(
                    unsafe { contact_math.get() },
                    &mut color.contacts,
                    range,
                    unsafe { sims.get() },
                    unsafe { states.get() },
                ),
                other => unreachable!("unexpected block type {other:?} in WarmStart"),
            }
        }
        StageType::Solve | StageType::Relax => {
            let use_bias = stage.stage_type == StageType::Solve;
            let color = &mut unsafe { colors.get() }[color_index()];
            match block.block_type {
                BlockType::GraphJoint => kernels::solve_joints(
                    unsafe { joint_math.get() },
                    &mut color.joints,
                    range,
                    unsafe { sims.get() },
                    unsafe { states.get() },
                    use_bias,
                    inv_h,
                    cfg,
                    &mut ctx.joint_state_bitset,
                    &mut ctx.joint_events,
                ),
                BlockType::GraphContact => kernels::solve_contacts(
                    unsafe { contact_math.get() },
                    &mut color.contacts,
                    range,
                    unsafe { sims.get() },
                    unsafe { states.get() },
                    use_bias,
                ),
                other => unreachable!("unexpected block type {other:?} in Solve/Relax"),
            }
        }
        StageType::Restitution => {
            let color = &mut unsafe { colors.get() }[color_index()];
            kernels::apply_restitution(
                unsafe { contact_math.get() },
                &mut color.contacts,
                range,
                unsafe { sims.get() },
                unsafe { states.get() },
            )
        }
        StageType::StoreImpulses => {
            let color = &mut unsafe { colors.get() }[color_index()];
            kernels::store_impulses(unsafe { contact_math.get() }, &mut color.contacts, range, &mut ctx.contact_hits)
        }
    }
}

/// Advances `body`'s world pose by its accumulated substep deltas, runs inline CCD for a
/// non-bullet fast body, defers a bullet body to the serial bullet pass, updates sleep
/// bookkeeping, and (for bodies CCD never touches) refreshes broad-phase bounds directly (§4.4).
#[allow(clippy::too_many_arguments)]
fn finalize_body<S, BP, CC>(
    body_index: usize,
    storage: &RacyMut<S>,
    broad_phase: &RacyMut<BP>,
    ccd_query: &CC,
    ccd_hooks: &CcdHooks<'_>,
    sensor_index_of: &(dyn Fn(ShapeId) -> Option<usize> + Sync),
    cfg: &SolverConfig,
    ctx: &mut TaskContext,
    body_move_events: &RacyMut<[BodyMoveEvent]>,
) where
    S: BodyStorage,
    BP: BroadPhase,
    CC: ContinuousCollision,
{
    let storage = unsafe { storage.get() };
    let broad_phase = unsafe { broad_phase.get() };

    let state = storage.states()[body_index];
    {
        let sim = &mut storage.sims_mut()[body_index];
        // `transform.rotation`/`center` are the running pose: this step's delta is composed onto
        // whatever pose the previous step (or creation) left behind, not rebuilt from a frozen
        // baseline (§4.4 step 1).
        sim.transform.rotation = (sim.transform.rotation * state.delta_rotation).normalize();
        sim.center += state.delta_position;
        sim.sync_transform_from_center();
        sim.flags.remove(BodyFlags::IS_FAST);
    }
    storage.states_mut()[body_index].reset_deltas();
    let sim_snapshot = storage.sims()[body_index];

    ctx.awake_island_bitset.set(sim_snapshot.island_id as usize);

    let mut non_sleepy = true;
    if sim_snapshot.kind == BodyKind::Dynamic {
        let linear_term = state.linear_velocity.norm() + state.angular_velocity.abs() * sim_snapshot.max_extent;
        // The delta-based term catches a body whose velocity this step was small but whose
        // actual displacement (e.g. from a solver correction) wasn't (§4.4 step 3).
        let delta_term = 0.5
            * cfg.inv_dt()
            * (state.delta_position.norm() + state.delta_rotation.im.abs() * sim_snapshot.max_extent);
        let sleep_velocity = linear_term.max(delta_term);
        let sleep_time = if !cfg.enable_sleep || sim_snapshot.sleep_disabled() || sleep_velocity > cfg.sleep_threshold {
            0.0
        } else {
            sim_snapshot.sleep_time + cfg.dt
        };
        storage.sims_mut()[body_index].sleep_time = sleep_time;
        non_sleepy = sleep_time < cfg.time_to_sleep;
        if non_sleepy && sleep_time > ctx.split_sleep_time {
            ctx.split_sleep_time = sleep_time;
            ctx.split_island_id = Some(sim_snapshot.island_id);
        }
    }

    // §4.4 step 4: `isFast` is recomputed fresh every step from this step's displacement, never
    // persisted from a previous one (only `isBullet` is a standing, user-set marker).
    let is_fast = non_sleepy
        && sim_snapshot.kind == BodyKind::Dynamic
        && cfg.enable_continuous
        && state.linear_velocity.norm() * cfg.dt > 0.5 * sim_snapshot.min_extent;
    if is_fast {
        storage.sims_mut()[body_index].flags.insert(BodyFlags::IS_FAST);
    }
    let sim_snapshot = storage.sims()[body_index];

    let mut handled_by_ccd = false;
    let mut deferred_to_bullet_pass = false;
    if is_fast {
        if sim_snapshot.is_bullet() {
            // The bullet sweep is built from `center0`/`rotation0` in the serial bullet pass
            // below, so the baseline must stay at this step's start pose until that pass runs.
            ctx.bullet_bodies.push(body_index);
            deferred_to_bullet_pass = true;
        } else {
            run_inline_ccd(&sim_snapshot, body_index, storage, broad_phase, ccd_query, ccd_hooks, sensor_index_of, cfg, ctx);
            handled_by_ccd = true;
        }
    }

    if !handled_by_ccd {
        refresh_body_bounds(body_index, storage, broad_phase, cfg, ctx);
    }

    if !deferred_to_bullet_pass {
        // §4.5: "If no hit, advance center0/rotation0 to current for next step" — and likewise
        // when a hit was accepted, since `run_inline_ccd` already committed the corrected pose.
        storage.sims_mut()[body_index].advance_sweep_baseline();
    }

    unsafe { body_move_events.get() }[body_index] = BodyMoveEvent {
        sim_index: body_index as u32,
        transform: storage.sims()[body_index].transform,
        fell_asleep: false,
    };
}

/// Shared by both the inline non-bullet pass and the serial bullet pass: runs
/// [`ccd::solve_continuous`] for one body's shapes, commits the interpolated pose if a hit was
/// accepted, and applies the refreshed per-shape bounds it reports.
#[allow(clippy::too_many_arguments)]
fn run_inline_ccd<S, BP, CC>(
    sim_snapshot: &BodySim,
    body_index: usize,
    storage: &mut S,
    broad_phase: &mut BP,
    ccd_query: &CC,
    ccd_hooks: &CcdHooks<'_>,
    sensor_index_of: &(dyn Fn(ShapeId) -> Option<usize> + Sync),
    cfg: &SolverConfig,
    ctx: &mut TaskContext,
) where
    S: BodyStorage,
    BP: BroadPhase,
    CC: ContinuousCollision,
{
    let sweep = Sweep {
        local_center: sim_snapshot.local_center,
        transform0: Transform2::new(
            sim_snapshot.center0 - sim_snapshot.rotation0 * sim_snapshot.local_center,
            sim_snapshot.rotation0,
        ),
        transform1: sim_snapshot.transform,
    };
    let shapes: Vec<ShapeId> = storage.shapes_of(body_index).to_vec();
    let outcome = ccd::solve_continuous(sim_snapshot, &shapes, &sweep, broad_phase, ccd_query, ccd_hooks, cfg);

    if let Some(pose) = outcome.interpolated_transform {
        let sim = &mut storage.sims_mut()[body_index];
        sim.transform = pose;
        sim.center = pose.transform_point(&sim.local_center);
        sim.flags.insert(BodyFlags::HAD_TIME_OF_IMPACT);
    }

    for hit in &outcome.sensor_hits {
        if let Some(sensor_index) = sensor_index_of(hit.sensor_shape) {
            ctx.sensor_hits.push(SensorHit {
                sensor_index,
                visitor: hit.visitor_shape,
            });
        }
    }
    ctx.dropped_sensor_hits += outcome.dropped_sensor_hits;

    for update in &outcome.shape_bounds {
        storage.set_fat_aabb(update.shape, update.aabb);
        if update.enlarged {
            ctx.enlarged_sim_bitset.set(update.shape.raw_index() as usize);
            broad_phase.enlarge_proxy(update.shape, update.aabb);
        }
        broad_phase.buffer_move(update.shape);
    }
}

/// Non-fast bodies (and fast bodies CCD never ran for, e.g. with continuous collision disabled)
/// never go through [`run_inline_ccd`]; their shapes' broad-phase bounds still need refreshing
/// every step the same way CCD's own final loop does for fast bodies (§4.4 step 6).
fn refresh_body_bounds<S, BP>(body_index: usize, storage: &mut S, broad_phase: &mut BP, cfg: &SolverConfig, ctx: &mut TaskContext)
where
    S: BodyStorage,
    BP: BroadPhase,
{
    let transform = storage.sims()[body_index].transform;
    let shapes: Vec<ShapeId> = storage.shapes_of(body_index).to_vec();
    for shape in shapes {
        let tight = storage.compute_aabb(shape, transform);
        let speculative = tight.inflated(cfg.speculative_distance);
        let fat = storage.fat_aabb(shape);
        let (aabb, enlarged) = if speculative.escapes(&fat) {
            (speculative.inflated(cfg.aabb_margin), true)
        } else {
            (speculative, false)
        };
        storage.set_fat_aabb(shape, aabb);
        if enlarged {
            ctx.enlarged_sim_bitset.set(shape.raw_index() as usize);
            broad_phase.enlarge_proxy(shape, aabb);
        }
        broad_phase.buffer_move(shape);
    }
}
