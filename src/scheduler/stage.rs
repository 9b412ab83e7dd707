//! The stage machine (§4.2): drives a sequence of [`SolverStage`]s to completion across
//! `worker_count` workers using lock-free CAS claiming within a stage and a single packed
//! "sync bits" word for the barrier between stages.
//!
//! Workers are expected to call [`StageMachine::run_worker`] once per physics step (one call per
//! worker, typically via [`crate::task_queue::TaskQueue`]); each call walks every stage in order,
//! claiming and executing whatever blocks it can, then waiting for the rest of the stage to
//! drain before moving on. Worker 0 is distinguished only in that it alone publishes the
//! sync-bits word once a stage's completion counter reaches its block count — every worker,
//! including worker 0, claims and executes blocks.

use std::sync::atomic::{AtomicU32, Ordering};

use super::blocks::SolverBlock;

/// Which pass a stage performs (§4.2, §4.3). Several of these recur once per active graph color.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StageType {
    PrepareJoints,
    PrepareContacts,
    IntegrateVelocities,
    WarmStart,
    Solve,
    IntegratePositions,
    Relax,
    Restitution,
    StoreImpulses,
}

/// One step of the stage-ordering pipeline: a block list plus the counter workers drain against.
pub struct SolverStage {
    pub stage_type: StageType,
    /// `Some(color_index)` for a per-color pass; `None` for stages that aren't color-scoped
    /// (`IntegrateVelocities`, `IntegratePositions`).
    pub color_index: Option<usize>,
    pub blocks: Vec<SolverBlock>,
    completed_count: AtomicU32,
}

impl SolverStage {
    pub fn new(stage_type: StageType, color_index: Option<usize>, blocks: Vec<SolverBlock>) -> Self {
        Self {
            stage_type,
            color_index,
            blocks,
            completed_count: AtomicU32::new(0),
        }
    }

    pub fn is_overflow(&self) -> bool {
        self.color_index == Some(crate::config::OVERFLOW_COLOR_INDEX)
    }
}

/// Sentinel `sync_bits` value meaning "abandon the step", used by [`StageMachine::abort`] to
/// unstick any worker still spinning (e.g. because a peer panicked).
pub const TERMINATE: u32 = u32::MAX;

/// Drives a fixed stage sequence for one physics step.
pub struct StageMachine {
    stages: Vec<SolverStage>,
    sync_bits: AtomicU32,
}

impl StageMachine {
    pub fn new(stages: Vec<SolverStage>) -> Self {
        Self {
            stages,
            sync_bits: AtomicU32::new(0),
        }
    }

    pub fn stages(&self) -> &[SolverStage] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Unsticks every worker currently spinning in [`Self::run_worker`], for panic/shutdown
    /// paths. Safe to call more than once.
    pub fn abort(&self) {
        self.sync_bits.store(TERMINATE, Ordering::Release);
    }

    /// Runs every stage to completion on the calling worker. `worker_index` must be in
    /// `0..worker_count` and unique among the callers for one `run_worker`/step "generation";
    /// `exec` executes the item range named by one claimed block, and is told which stage the
    /// block belongs to (stage type + color index) so the caller can dispatch to the right
    /// per-substep kernel (§4.3) without re-deriving stage context from the block alone.
    ///
    /// Returns `false` if the run was aborted via [`Self::abort`] before every stage finished.
    pub fn run_worker(
        &self,
        worker_index: usize,
        worker_count: usize,
        mut exec: impl FnMut(&SolverStage, &SolverBlock),
    ) -> bool {
        for (stage_index, stage) in self.stages.iter().enumerate() {
            let stage_index = stage_index as u32;

            if !stage.blocks.is_empty() {
                claim_and_run(stage, worker_index, worker_count, &mut |block| exec(stage, block));
            }

            if worker_index == 0 {
                if !self.spin_until_aborted(|| {
                    stage.completed_count.load(Ordering::Acquire) as usize >= stage.blocks.len()
                }) {
                    return false;
                }
                self.sync_bits.store(stage_index + 1, Ordering::Release);
            } else if !self.spin_until_aborted(|| {
                let bits = self.sync_bits.load(Ordering::Acquire);
                bits == TERMINATE || bits > stage_index
            }) {
                return false;
            }

            if self.sync_bits.load(Ordering::Acquire) == TERMINATE {
                return false;
            }
        }
        true
    }

    /// Resets every stage's completion counter and every block's sync index so the same
    /// `StageMachine` can be reused for the next physics step without reallocating blocks.
    pub fn reset(&mut self) {
        self.sync_bits.store(0, Ordering::Release);
        for stage in &mut self.stages {
            stage.completed_count.store(0, Ordering::Release);
            for block in &mut stage.blocks {
                *block.sync_index.get_mut() = 0;
            }
        }
    }

    /// Bounded spin-then-yield wait, via `crossbeam`'s backoff helper: cheap busy-spin while a
    /// peer worker is expected to finish imminently, falling back to yielding the OS thread once
    /// it's been spinning long enough that the peer was probably descheduled.
    fn spin_until_aborted(&self, mut cond: impl FnMut() -> bool) -> bool {
        let backoff = crossbeam::utils::Backoff::new();
        loop {
            if self.sync_bits.load(Ordering::Acquire) == TERMINATE {
                return false;
            }
            if cond() {
                return true;
            }
            backoff.snooze();
        }
    }
}

/// CAS-claims every block this worker can reach: forward from a per-worker starting offset to
/// the end of the stage, then backward-steals whatever's left behind the starting offset. Two
/// workers that start near each other diverge in opposite directions, which keeps them from
/// contending on the same handful of blocks.
fn claim_and_run(
    stage: &SolverStage,
    worker_index: usize,
    worker_count: usize,
    exec: &mut impl FnMut(&SolverBlock),
) {
    let n = stage.blocks.len();
    let worker_count = worker_count.max(1);
    let start = (worker_index * n) / worker_count;

    for i in start..n {
        try_claim_and_run(stage, i, exec);
    }
    for i in (0..start).rev() {
        try_claim_and_run(stage, i, exec);
    }
}

fn try_claim_and_run(stage: &SolverStage, index: usize, exec: &mut impl FnMut(&SolverBlock)) {
    let block = &stage.blocks[index];
    if block.try_claim(0, 1) {
        exec(block);
        stage.completed_count.fetch_add(1, Ordering::AcqRel);
    }
}
