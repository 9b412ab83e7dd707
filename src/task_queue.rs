//! The generic task-queue façade (§1, §6: `enqueueTaskFcn`/`finishTaskFcn`).
//!
//! The solver never spawns threads itself; it hands work to whatever [`TaskQueue`] the host
//! plugs in. This mirrors `rapier2d`'s split (see `parallel_island_solver.rs`) between an inline,
//! non-parallel path and a `rayon`-backed path behind the `parallel` feature.

/// A task function for parallel-for style dispatch: `(start_index, end_index, thread_index)`
/// (§6, "Task function signature for parallel-for").
pub type TaskFn<'a> = dyn Fn(usize, usize, usize) + Sync + 'a;

/// `enqueueTaskFcn`/`finishTaskFcn` (§6). `enqueue` may run `task` inline and return `None`
/// (§6: "inline execution allowed"); callers must tolerate that and must always pass whatever
/// `enqueue` returned to `finish`, exactly once.
pub trait TaskQueue {
    type Handle;

    fn enqueue(&self, item_count: usize, min_range: usize, task: &TaskFn<'_>) -> Option<Self::Handle>;
    fn finish(&self, handle: Option<Self::Handle>);
}

/// Runs everything on the calling thread. `item_count` becomes a single `(0, item_count, 0)`
/// invocation, i.e. `workerCount` effectively collapses to 1.
#[derive(Default)]
pub struct InlineTaskQueue;

impl TaskQueue for InlineTaskQueue {
    type Handle = ();

    fn enqueue(&self, item_count: usize, _min_range: usize, task: &TaskFn<'_>) -> Option<()> {
        if item_count > 0 {
            task(0, item_count, 0);
        }
        None
    }

    fn finish(&self, _handle: Option<()>) {}
}

/// Dispatches onto a `rayon` thread pool. `enqueue` blocks until every spawned chunk completes
/// (`rayon::scope` only returns once its spawned tasks have joined), so `finish` has nothing
/// left to do — the join already happened inside `enqueue`. This collapses the
/// enqueue/finish split into a single call the way a `ParallelIslandSolver`-style driver drives
/// its `rayon::Scope` (spawn now, implicit join at scope exit).
#[cfg(feature = "parallel")]
#[derive(Default)]
pub struct RayonTaskQueue;

#[cfg(feature = "parallel")]
impl TaskQueue for RayonTaskQueue {
    type Handle = ();

    fn enqueue(&self, item_count: usize, min_range: usize, task: &TaskFn<'_>) -> Option<()> {
        if item_count == 0 {
            return None;
        }
        let chunk = min_range.max(1);
        rayon::scope(|scope| {
            let mut start = 0;
            while start < item_count {
                let end = (start + chunk).min(item_count);
                scope.spawn(move |_| task(start, end, start));
                start = end;
            }
        });
        None
    }

    fn finish(&self, _handle: Option<()>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn inline_queue_runs_the_full_range_on_the_caller() {
        let queue = InlineTaskQueue;
        let sum = AtomicUsize::new(0);
        let handle = queue.enqueue(4, 1, &|start, end, _tidx| {
            for i in start..end {
                sum.fetch_add(i, Ordering::Relaxed);
            }
        });
        queue.finish(handle);
        assert_eq!(sum.load(Ordering::Relaxed), 0 + 1 + 2 + 3);
    }

    #[test]
    fn inline_queue_with_zero_items_invokes_nothing() {
        let queue = InlineTaskQueue;
        let calls = AtomicUsize::new(0);
        let handle = queue.enqueue(0, 1, &|_, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        queue.finish(handle);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn rayon_queue_dispatches_every_chunk_exactly_once() {
        let queue = RayonTaskQueue;
        let seen = std::sync::Mutex::new(Vec::new());
        let handle = queue.enqueue(8, 1, &|start, end, _tidx| {
            assert_eq!(end - start, 1);
            seen.lock().unwrap().push(start);
        });
        queue.finish(handle);
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }
}
