//! The sensor overlap engine (§4.6): a double-buffered per-sensor diff that turns parallel
//! broad-phase queries plus CCD-discovered mid-step hits into deterministic begin/end touch
//! events, regardless of how many workers ran the query phase.

use crate::aabb::Aabb;
use crate::config::SENSOR_TOUCH_EPSILON_SCALE;
use crate::events::{SensorBeginTouchEvent, SensorEndTouchEvent, StepEvents};
use crate::external::{BroadPhase, CustomFilter, ShapeDistanceQuery, TreeKind};
use crate::handle::ShapeId;
use crate::math::{Real, Transform2};

/// A shape reference recorded by a sensor ("Visitor"). [`ShapeId`] already carries
/// `{index, world, generation}` (§6), so a visitor is exactly that value — no separate
/// `{shapeId, generation}` wrapper type is needed.
pub type Visitor = ShapeId;

/// `{sensorId, visitorId}` (§3), produced mid-step by CCD (§4.5) and absorbed into a sensor's
/// scratch overlap set before that sensor's own broad-phase query runs (§4.6 step 2).
#[derive(Copy, Clone, Debug)]
pub struct SensorHit {
    pub sensor_index: usize,
    pub visitor: Visitor,
}

/// One sensor's double-buffered overlap state (§3). `overlaps1` holds the previous step's
/// sorted, deduped set between steps (§3 invariant 5); `overlaps2` is scratch filled out during
/// the current step's query.
pub struct Sensor {
    pub shape: ShapeId,
    pub aabb: Aabb,
    pub mask_bits: u32,
    /// Sensor body disabled, or sensor events turned off for this sensor (§4.6 step 3).
    pub disabled: bool,
    overlaps1: Vec<Visitor>,
    overlaps2: Vec<Visitor>,
    hits: Vec<Visitor>,
}

impl Sensor {
    pub fn new(shape: ShapeId, aabb: Aabb, mask_bits: u32) -> Self {
        Self {
            shape,
            aabb,
            mask_bits,
            disabled: false,
            overlaps1: Vec::new(),
            overlaps2: Vec::new(),
            hits: Vec::new(),
        }
    }

    /// Records a CCD-discovered mid-step hit (§4.5 "for every sensor hit ... append to the
    /// worker's sensorHits output buffer") for absorption on this sensor's next query pass.
    pub fn push_hit(&mut self, visitor: Visitor) {
        self.hits.push(visitor);
    }

    /// The current, previous-step overlap set (§3 invariant 5: sorted ascending, deduped).
    pub fn overlaps(&self) -> &[Visitor] {
        &self.overlaps1
    }

    /// All entries of the in-progress scratch set, used by [`destroy`] to flush ends when a
    /// sensor is removed mid-lifecycle (§4.6 "On sensor destruction").
    pub fn pending_overlaps(&self) -> &[Visitor] {
        &self.overlaps2
    }
}

fn sort_key(v: &Visitor) -> (u32, u32) {
    (v.raw_index(), v.generation)
}

/// Runs §4.6 steps 1–6 for one sensor: swap buffers, absorb CCD hits, broad-phase query,
/// sort+dedup, and diff against the previous step's set. Returns whether the overlap set
/// changed — event *emission* happens later, serially, via [`emit_events`] (§4.6 "Event
/// emission"), after every worker's sensors have been queried and diff bits unioned (§5).
#[allow(clippy::too_many_arguments)]
pub fn query_sensor(
    sensor: &mut Sensor,
    broad_phase: &impl BroadPhase,
    shape_distance: &impl ShapeDistanceQuery,
    transform_of: &impl Fn(ShapeId) -> Transform2,
    same_body: &impl Fn(ShapeId, ShapeId) -> bool,
    sensor_enabled_on: &impl Fn(ShapeId) -> bool,
    collision_filter: &impl Fn(ShapeId, ShapeId) -> bool,
    custom_filter: Option<&CustomFilter<'_>>,
) -> bool {
    std::mem::swap(&mut sensor.overlaps1, &mut sensor.overlaps2);
    sensor.overlaps2.clear();
    sensor.overlaps2.append(&mut sensor.hits);

    if sensor.disabled {
        // Flush every former overlap as an end next time events are emitted (§4.6 step 3);
        // `overlaps2` is left empty (no query ran), so the merge below naturally emits only
        // ends.
        sensor.overlaps2.clear();
        return true;
    }

    let xf_sensor = transform_of(sensor.shape);
    let mut candidates = Vec::new();
    for tree in [TreeKind::Static, TreeKind::Kinematic, TreeKind::Dynamic] {
        broad_phase.query(tree, sensor.aabb, sensor.mask_bits, &mut |candidate| {
            if candidate == sensor.shape
                || !sensor_enabled_on(candidate)
                || same_body(sensor.shape, candidate)
                || !collision_filter(sensor.shape, candidate)
            {
                return true;
            }
            if let Some(filter) = custom_filter {
                if !filter(sensor.shape, candidate) {
                    return true;
                }
            }
            candidates.push(candidate);
            true
        });
    }

    let touch_epsilon = SENSOR_TOUCH_EPSILON_SCALE * Real::EPSILON;
    for candidate in candidates {
        let xf_candidate = transform_of(candidate);
        let distance = shape_distance.shape_distance(sensor.shape, xf_sensor, candidate, xf_candidate);
        if distance < touch_epsilon {
            sensor.overlaps2.push(candidate);
        }
    }

    sensor.overlaps2.sort_unstable_by_key(sort_key);
    sensor.overlaps2.dedup_by_key(|v| sort_key(v));

    sensor.overlaps1.len() != sensor.overlaps2.len()
        || sensor
            .overlaps1
            .iter()
            .zip(sensor.overlaps2.iter())
            .any(|(a, b)| a != b)
}

/// The classic sorted-merge diff (§4.6 "Event emission"), run serially after every dirty
/// sensor's `overlaps1`/`overlaps2` are final. `old` is the previous step's set, `new` is this
/// step's.
pub fn emit_events(sensor_shape: ShapeId, old: &[Visitor], new: &[Visitor], events: &mut StepEvents) {
    let (mut i, mut j) = (0usize, 0usize);
    while i < old.len() && j < new.len() {
        let a = old[i];
        let b = new[j];
        match a.raw_index().cmp(&b.raw_index()) {
            std::cmp::Ordering::Equal => match a.generation.cmp(&b.generation) {
                std::cmp::Ordering::Less => {
                    // The old visitor's slot was destroyed and reused by a newer shape;
                    // the stale reference must still be flushed as an end.
                    events.sensor_end_events.push(SensorEndTouchEvent {
                        sensor_shape,
                        visitor_shape: a,
                    });
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    events.sensor_begin_events.push(SensorBeginTouchEvent {
                        sensor_shape,
                        visitor_shape: b,
                    });
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            },
            std::cmp::Ordering::Less => {
                events.sensor_end_events.push(SensorEndTouchEvent {
                    sensor_shape,
                    visitor_shape: a,
                });
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                events.sensor_begin_events.push(SensorBeginTouchEvent {
                    sensor_shape,
                    visitor_shape: b,
                });
                j += 1;
            }
        }
    }
    for &a in &old[i..] {
        events.sensor_end_events.push(SensorEndTouchEvent {
            sensor_shape,
            visitor_shape: a,
        });
    }
    for &b in &new[j..] {
        events.sensor_begin_events.push(SensorBeginTouchEvent {
            sensor_shape,
            visitor_shape: b,
        });
    }
}

/// Emits end events for every entry still pending on a sensor that is about to be destroyed
/// (§4.6 "On sensor destruction"). `RemoveSwap`-ing the sensor out of its owning list and fixing
/// up the moved sensor's shape's `sensorIndex` is storage bookkeeping external to this crate
/// (§1).
pub fn destroy(sensor: &Sensor, events: &mut StepEvents) {
    for &visitor in sensor.pending_overlaps() {
        events.sensor_end_events.push(SensorEndTouchEvent {
            sensor_shape: sensor.shape,
            visitor_shape: visitor,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(raw_index: u32, generation: u32) -> ShapeId {
        ShapeId::new(raw_index, 0, generation)
    }

    #[test]
    fn emit_events_reports_begins_for_new_and_ends_for_dropped() {
        let mut events = StepEvents::default();
        let old = vec![shape(1, 1), shape(3, 1)];
        let new = vec![shape(2, 1), shape(3, 1)];
        emit_events(shape(99, 1), &old, &new, &mut events);
        assert_eq!(events.sensor_end_events.len(), 1);
        assert_eq!(events.sensor_end_events[0].visitor_shape, shape(1, 1));
        assert_eq!(events.sensor_begin_events.len(), 1);
        assert_eq!(events.sensor_begin_events[0].visitor_shape, shape(2, 1));
    }

    #[test]
    fn emit_events_flushes_a_destroyed_and_reused_slot_as_end_then_begin() {
        let mut events = StepEvents::default();
        let old = vec![shape(5, 1)];
        let new = vec![shape(5, 2)]; // same raw index, newer generation: slot was reused
        emit_events(shape(99, 1), &old, &new, &mut events);
        assert_eq!(events.sensor_end_events.len(), 1);
        assert_eq!(events.sensor_end_events[0].visitor_shape, shape(5, 1));
        assert_eq!(events.sensor_begin_events.len(), 1);
        assert_eq!(events.sensor_begin_events[0].visitor_shape, shape(5, 2));
    }

    #[test]
    fn emit_events_emits_nothing_for_an_unchanged_set() {
        let mut events = StepEvents::default();
        let set = vec![shape(1, 1), shape(2, 1)];
        emit_events(shape(99, 1), &set, &set, &mut events);
        assert!(events.sensor_begin_events.is_empty());
        assert!(events.sensor_end_events.is_empty());
    }

    #[test]
    fn destroy_flushes_every_pending_overlap_as_an_end() {
        let mut sensor = Sensor::new(shape(0, 1), Aabb::new(crate::math::Vec2::zeros(), crate::math::Vec2::zeros()), 0);
        sensor.overlaps2 = vec![shape(1, 1), shape(2, 1)];
        let mut events = StepEvents::default();
        destroy(&sensor, &mut events);
        assert_eq!(events.sensor_end_events.len(), 2);
    }

    #[test]
    fn query_sensor_dedups_a_ccd_hit_that_duplicates_a_query_hit() {
        struct NoopBroadPhase;
        impl BroadPhase for NoopBroadPhase {
            fn query(&self, _tree: TreeKind, _aabb: Aabb, _mask_bits: u32, callback: &mut dyn FnMut(ShapeId) -> bool) {
                callback(shape(7, 1));
            }
            fn enlarge_proxy(&mut self, _shape: ShapeId, _aabb: Aabb) {}
            fn buffer_move(&mut self, _shape: ShapeId) {}
        }
        struct ZeroDistance;
        impl ShapeDistanceQuery for ZeroDistance {
            fn shape_distance(&self, _a: ShapeId, _xa: Transform2, _b: ShapeId, _xb: Transform2) -> Real {
                0.0
            }
        }

        let mut sensor = Sensor::new(shape(0, 1), Aabb::new(crate::math::Vec2::zeros(), crate::math::Vec2::zeros()), u32::MAX);
        sensor.push_hit(shape(7, 1));

        let changed = query_sensor(
            &mut sensor,
            &NoopBroadPhase,
            &ZeroDistance,
            &|_| Transform2::identity(),
            &|_, _| false,
            &|_| true,
            &|_, _| true,
            None,
        );

        assert!(changed);
        assert_eq!(sensor.overlaps().len(), 1);
    }
}
