//! Continuous collision / time-of-impact sweep pipeline (§4.5).
//!
//! `solve_continuous` runs the full per-body sweep: union the fat and current AABBs into a
//! query box, sweep it against the broad-phase, accept the earliest solid TOI while absorbing
//! any sensor hits encountered along the way, and report the refreshed per-shape bounds the
//! caller (body finalization, §4.4) needs to update its bitsets with. Shape geometry itself is
//! external per §1 — every per-shape computation a concrete shape would need (swept AABB, TOI,
//! the "core circle" retest) is expressed through [`crate::external::ContinuousCollision`] plus
//! the small hook closures below, mirroring a narrow `QueryDispatcher`-style
//! indirection rather than this crate knowing any shape math.

use arrayvec::ArrayVec;

use crate::aabb::Aabb;
use crate::config::{SolverConfig, CORE_FRACTION, MAX_SENSOR_HITS_PER_BODY};
use crate::data::BodySim;
use crate::external::{
    BroadPhase, ContinuousCollision, CustomFilter, PreSolveFilter, Sweep, ToiOutput, TreeKind,
};
use crate::handle::ShapeId;
use crate::math::{Real, Transform2};

/// A sensor overlap discovered mid-sweep (§4.5 "for every sensor hit ... append to the worker's
/// sensorHits output buffer"). Carries the fraction it was found at so the caller can re-check
/// it against the final committed fraction.
#[derive(Copy, Clone, Debug)]
pub struct CcdSensorHit {
    pub sensor_shape: ShapeId,
    pub visitor_shape: ShapeId,
    pub fraction: Real,
}

/// A refreshed AABB for one of the body's shapes, to be folded into `enlargedSimBitSet` /
/// `fatAabb` storage by the caller (§4.4 step 6, §4.5 final paragraph).
#[derive(Copy, Clone, Debug)]
pub struct ShapeBoundsUpdate {
    pub shape: ShapeId,
    pub aabb: Aabb,
    pub enlarged: bool,
}

/// Everything [`solve_continuous`] produces for one body.
#[derive(Debug, Default)]
pub struct CcdOutcome {
    /// The committed TOI fraction in `[0, 1]`; `1.0` means no hit was accepted.
    pub fraction: Real,
    pub had_time_of_impact: bool,
    /// `Some(pose)` only when `fraction < 1`, i.e. the body's pose was pulled back (§4.5 "After
    /// all shapes processed, if context.fraction < 1, interpolate pose to fraction").
    pub interpolated_transform: Option<Transform2>,
    pub sensor_hits: Vec<CcdSensorHit>,
    pub dropped_sensor_hits: u32,
    pub shape_bounds: Vec<ShapeBoundsUpdate>,
}

/// External accessors [`solve_continuous`] needs per candidate shape. Grouped into one struct
/// (rather than a long closure parameter list) since every one of these narrow, storage-owned
/// questions is needed for every candidate the broad-phase hands back.
pub struct CcdHooks<'a> {
    pub compute_aabb: &'a (dyn Fn(ShapeId, Transform2) -> Aabb + Sync),
    pub fat_aabb_of: &'a (dyn Fn(ShapeId) -> Aabb + Sync),
    pub sweep_of: &'a (dyn Fn(ShapeId) -> Sweep + Sync),
    pub is_sensor: &'a (dyn Fn(ShapeId) -> bool + Sync),
    pub is_enabled: &'a (dyn Fn(ShapeId) -> bool + Sync),
    pub is_bullet_shape: &'a (dyn Fn(ShapeId) -> bool + Sync),
    pub mask_bits_of: &'a (dyn Fn(ShapeId) -> u32 + Sync),
    pub same_body: &'a (dyn Fn(ShapeId, ShapeId) -> bool + Sync),
    pub excluded_pair: &'a (dyn Fn(ShapeId, ShapeId) -> bool + Sync),
    /// For chain-segment candidates only: `Some((separation1, separation2))` feeding the
    /// core-fraction early-out (§4.5); `None` when the candidate isn't a segment or the host
    /// doesn't implement the check.
    pub chain_segment_separations: Option<&'a (dyn Fn(ShapeId, ShapeId) -> Option<(Real, Real)> + Sync)>,
    pub pre_solve: Option<&'a PreSolveFilter<'a>>,
    pub custom_filter: Option<&'a CustomFilter<'a>>,
}

/// Runs §4.5's sweep pipeline for one fast body.
///
/// `body_shapes` are the shapes attached to `body`; `sweep` is the body-level motion from
/// `(center0, rotation0)` to `(center, transform.rotation)` the caller built from `body` before
/// calling (the same sweep applies to every shape on a rigid body).
pub fn solve_continuous(
    body: &BodySim,
    body_shapes: &[ShapeId],
    sweep: &Sweep,
    broad_phase: &impl BroadPhase,
    toi: &impl ContinuousCollision,
    hooks: &CcdHooks<'_>,
    cfg: &SolverConfig,
) -> CcdOutcome {
    let mut outcome = CcdOutcome {
        fraction: 1.0,
        ..Default::default()
    };
    let mut raw_sensor_hits: ArrayVec<CcdSensorHit, MAX_SENSOR_HITS_PER_BODY> = ArrayVec::new();
    let is_bullet = body.is_bullet();
    let core_radius = CORE_FRACTION * body.min_extent;

    for &shape in body_shapes {
        if (hooks.is_sensor)(shape) {
            continue;
        }

        let box2 = (hooks.compute_aabb)(shape, sweep.transform1);
        let box1 = (hooks.fat_aabb_of)(shape);
        let swept_box = box1.union(&box2);
        let mask_bits = (hooks.mask_bits_of)(shape);

        let trees: &[TreeKind] = if is_bullet {
            &[TreeKind::Static, TreeKind::Kinematic, TreeKind::Dynamic]
        } else {
            &[TreeKind::Static]
        };

        let mut candidates = Vec::new();
        for &tree in trees {
            broad_phase.query(tree, swept_box, mask_bits, &mut |candidate| {
                candidates.push(candidate);
                true
            });
        }

        for candidate in candidates {
            if candidate == shape
                || (hooks.same_body)(shape, candidate)
                || !(hooks.is_enabled)(candidate)
                || (hooks.excluded_pair)(shape, candidate)
                // Two bullets never CCD against each other: each resolves its own sweep
                // independently, so a mutual pair would otherwise be solved from both sides.
                || (is_bullet && (hooks.is_bullet_shape)(candidate))
            {
                continue;
            }
            if let Some(filter) = hooks.custom_filter {
                if !filter(shape, candidate) {
                    continue;
                }
            }

            let candidate_sweep = (hooks.sweep_of)(candidate);

            if (hooks.is_sensor)(candidate) {
                if let ToiOutput::Hit { fraction, .. } =
                    toi.time_of_impact(shape, sweep, candidate, &candidate_sweep, outcome.fraction)
                {
                    if fraction <= outcome.fraction {
                        if raw_sensor_hits
                            .try_push(CcdSensorHit {
                                sensor_shape: candidate,
                                visitor_shape: shape,
                                fraction,
                            })
                            .is_err()
                        {
                            outcome.dropped_sensor_hits += 1;
                        }
                    }
                }
                continue;
            }

            if let Some(separations_of) = hooks.chain_segment_separations {
                if let Some((separation1, separation2)) = separations_of(shape, candidate) {
                    let rejected = separation1 < 0.0
                        || (separation1 - separation2 < core_radius && separation2 > core_radius);
                    if rejected {
                        continue;
                    }
                }
            }

            let mut result = toi.time_of_impact(shape, sweep, candidate, &candidate_sweep, outcome.fraction);

            if let ToiOutput::Overlapped = result {
                // fraction == 0: re-test against a small "core" circle to rule out a
                // swept-silhouette false positive (§4.5).
                result =
                    toi.time_of_impact_core(shape, sweep, core_radius, candidate, &candidate_sweep, outcome.fraction);
                if let ToiOutput::Hit { fraction, .. } = result {
                    if fraction <= 0.0 {
                        result = ToiOutput::Overlapped;
                    }
                } else {
                    result = ToiOutput::Separated;
                }
            }

            if let ToiOutput::Hit { fraction, point, normal } = result {
                if fraction > 0.0 && fraction < outcome.fraction {
                    let accepted = match hooks.pre_solve {
                        Some(filter) => filter(shape, candidate, point, normal),
                        None => true,
                    };
                    if accepted {
                        outcome.fraction = fraction;
                        outcome.had_time_of_impact = true;
                    }
                }
            }
        }
    }

    outcome.sensor_hits = raw_sensor_hits
        .into_iter()
        .filter(|hit| hit.fraction < outcome.fraction)
        .collect();

    if outcome.fraction < 1.0 {
        outcome.interpolated_transform = Some(sweep.interpolate(outcome.fraction));
    }

    let final_transform = outcome.interpolated_transform.unwrap_or(sweep.transform1);
    for &shape in body_shapes {
        let tight = (hooks.compute_aabb)(shape, final_transform);
        let speculative = tight.inflated(cfg.speculative_distance);
        let fat = (hooks.fat_aabb_of)(shape);
        let (aabb, enlarged) = if speculative.escapes(&fat) {
            (speculative.inflated(cfg.aabb_margin), true)
        } else {
            (speculative, false)
        };
        outcome.shape_bounds.push(ShapeBoundsUpdate { shape, aabb, enlarged });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BodyFlags, BodyKind};
    use crate::math::{Rot2, Vec2};

    fn body(min_extent: Real, bullet: bool) -> BodySim {
        BodySim {
            kind: BodyKind::Dynamic,
            center: Vec2::new(1.0, 0.0),
            transform: Transform2::identity(),
            center0: Vec2::zeros(),
            rotation0: Rot2::identity(),
            inv_mass: 1.0,
            inv_inertia: 1.0,
            local_center: Vec2::zeros(),
            min_extent,
            max_extent: min_extent,
            force: Vec2::zeros(),
            torque: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            island_id: 0,
            flags: if bullet {
                BodyFlags::IS_BULLET | BodyFlags::IS_FAST
            } else {
                BodyFlags::IS_FAST
            },
            sleep_time: 0.0,
        }
    }

    fn shape(raw_index: u32) -> ShapeId {
        ShapeId::new(raw_index, 0, 1)
    }

    struct AllStaticBroadPhase(Vec<ShapeId>);
    impl BroadPhase for AllStaticBroadPhase {
        fn query(&self, tree: TreeKind, _aabb: Aabb, _mask_bits: u32, callback: &mut dyn FnMut(ShapeId) -> bool) {
            if tree == TreeKind::Static {
                for &s in &self.0 {
                    if !callback(s) {
                        break;
                    }
                }
            }
        }
        fn enlarge_proxy(&mut self, _shape: ShapeId, _aabb: Aabb) {}
        fn buffer_move(&mut self, _shape: ShapeId) {}
    }

    struct FixedToi {
        fraction: Real,
    }
    impl ContinuousCollision for FixedToi {
        fn time_of_impact(&self, _a: ShapeId, _sa: &Sweep, _b: ShapeId, _sb: &Sweep, _max: Real) -> ToiOutput {
            ToiOutput::Hit {
                fraction: self.fraction,
                point: Vec2::zeros(),
                normal: Vec2::new(1.0, 0.0),
            }
        }
        fn time_of_impact_core(
            &self,
            _a: ShapeId,
            _sa: &Sweep,
            _r: Real,
            _b: ShapeId,
            _sb: &Sweep,
            _max: Real,
        ) -> ToiOutput {
            ToiOutput::Separated
        }
    }

    fn default_hooks() -> CcdHooks<'static> {
        CcdHooks {
            compute_aabb: &|_s, xf| Aabb::new(xf.translation - Vec2::new(0.1, 0.1), xf.translation + Vec2::new(0.1, 0.1)),
            fat_aabb_of: &|_s| Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0)),
            sweep_of: &|_s| Sweep {
                local_center: Vec2::zeros(),
                transform0: Transform2::identity(),
                transform1: Transform2::identity(),
            },
            is_sensor: &|_s| false,
            is_enabled: &|_s| true,
            is_bullet_shape: &|_s| false,
            mask_bits_of: &|_s| u32::MAX,
            same_body: &|_a, _b| false,
            excluded_pair: &|_a, _b| false,
            chain_segment_separations: None,
            pre_solve: None,
            custom_filter: None,
        }
    }

    #[test]
    fn accepts_a_toi_strictly_between_zero_and_one() {
        let b = body(1.0, false);
        let sweep = Sweep {
            local_center: Vec2::zeros(),
            transform0: Transform2::identity(),
            transform1: Transform2::new(Vec2::new(1.0, 0.0), Rot2::identity()),
        };
        let broad_phase = AllStaticBroadPhase(vec![shape(1)]);
        let toi = FixedToi { fraction: 0.5 };
        let hooks = default_hooks();
        let out = solve_continuous(&b, &[shape(0)], &sweep, &broad_phase, &toi, &hooks, &SolverConfig::default());
        assert!(out.had_time_of_impact);
        assert_eq!(out.fraction, 0.5);
        assert!(out.interpolated_transform.is_some());
    }

    #[test]
    fn pre_solve_veto_suppresses_the_hit() {
        let b = body(1.0, false);
        let sweep = Sweep {
            local_center: Vec2::zeros(),
            transform0: Transform2::identity(),
            transform1: Transform2::new(Vec2::new(1.0, 0.0), Rot2::identity()),
        };
        let broad_phase = AllStaticBroadPhase(vec![shape(1)]);
        let toi = FixedToi { fraction: 0.5 };
        let mut hooks = default_hooks();
        let veto: &PreSolveFilter<'_> = &|_a, _b, _p, _n| false;
        hooks.pre_solve = Some(veto);
        let out = solve_continuous(&b, &[shape(0)], &sweep, &broad_phase, &toi, &hooks, &SolverConfig::default());
        assert!(!out.had_time_of_impact);
        assert_eq!(out.fraction, 1.0);
        assert!(out.interpolated_transform.is_none());
    }

    #[test]
    fn non_bullet_never_queries_dynamic_or_kinematic_trees() {
        let b = body(1.0, false);
        let sweep = Sweep {
            local_center: Vec2::zeros(),
            transform0: Transform2::identity(),
            transform1: Transform2::identity(),
        };
        struct DynamicOnlyBroadPhase;
        impl BroadPhase for DynamicOnlyBroadPhase {
            fn query(&self, tree: TreeKind, _aabb: Aabb, _mask_bits: u32, callback: &mut dyn FnMut(ShapeId) -> bool) {
                if tree != TreeKind::Static {
                    callback(shape(9));
                }
            }
            fn enlarge_proxy(&mut self, _shape: ShapeId, _aabb: Aabb) {}
            fn buffer_move(&mut self, _shape: ShapeId) {}
        }
        let toi = FixedToi { fraction: 0.2 };
        let hooks = default_hooks();
        let out = solve_continuous(&b, &[shape(0)], &sweep, &DynamicOnlyBroadPhase, &toi, &hooks, &SolverConfig::default());
        assert!(!out.had_time_of_impact);
    }

    #[test]
    fn sensor_hits_past_the_final_fraction_are_dropped() {
        let b = body(1.0, false);
        let sweep = Sweep {
            local_center: Vec2::zeros(),
            transform0: Transform2::identity(),
            transform1: Transform2::new(Vec2::new(1.0, 0.0), Rot2::identity()),
        };
        // Candidate 1 is a sensor hit at fraction 0.8; candidate 2 is a solid hit at 0.3, which
        // must retroactively drop the sensor hit recorded before it (§4.5 monotonicity).
        struct TwoCandidates;
        impl BroadPhase for TwoCandidates {
            fn query(&self, tree: TreeKind, _aabb: Aabb, _mask_bits: u32, callback: &mut dyn FnMut(ShapeId) -> bool) {
                if tree == TreeKind::Static {
                    callback(shape(1));
                    callback(shape(2));
                }
            }
            fn enlarge_proxy(&mut self, _shape: ShapeId, _aabb: Aabb) {}
            fn buffer_move(&mut self, _shape: ShapeId) {}
        }
        struct VaryingToi;
        impl ContinuousCollision for VaryingToi {
            fn time_of_impact(&self, _a: ShapeId, _sa: &Sweep, b: ShapeId, _sb: &Sweep, _max: Real) -> ToiOutput {
                if b == shape(1) {
                    ToiOutput::Hit { fraction: 0.8, point: Vec2::zeros(), normal: Vec2::new(1.0, 0.0) }
                } else {
                    ToiOutput::Hit { fraction: 0.3, point: Vec2::zeros(), normal: Vec2::new(1.0, 0.0) }
                }
            }
            fn time_of_impact_core(&self, _a: ShapeId, _sa: &Sweep, _r: Real, _b: ShapeId, _sb: &Sweep, _max: Real) -> ToiOutput {
                ToiOutput::Separated
            }
        }
        let mut hooks = default_hooks();
        hooks.is_sensor = &|s| s == shape(1);
        let out = solve_continuous(&b, &[shape(0)], &sweep, &TwoCandidates, &VaryingToi, &hooks, &SolverConfig::default());
        assert_eq!(out.fraction, 0.3);
        assert!(out.sensor_hits.is_empty(), "sensor hit at 0.8 must be dropped once the solid hit at 0.3 commits");
    }
}
