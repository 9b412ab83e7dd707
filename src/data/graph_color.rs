//! The constraint graph: a greedy, body-disjoint coloring of joints and contacts (§9 "Graph
//! coloring", §3.1 ADDED "Color assignment").
//!
//! Each non-overflow [`GraphColor`] holds constraints that share no body, so every block within
//! a color can be solved in parallel without locking (§3 invariant 2, §8 property 3). A
//! constraint that cannot fit any of the `GRAPH_COLOR_COUNT - 1` regular colors falls into the
//! reserved overflow color at `OVERFLOW_COLOR_INDEX`, which the stage machine always solves
//! serially on the main worker (§4.2).

use rustc_hash::FxHashSet;

use crate::config::{GRAPH_COLOR_COUNT, OVERFLOW_COLOR_INDEX};

/// Implemented by whatever joint/contact sim type the host plugs in, so the colorer can see
/// which bodies a constraint touches without knowing anything else about it.
///
/// `None` means the endpoint is a static/world anchor: it never conflicts with anything, since
/// static bodies never move and are never solved against another constraint in the same color.
pub trait ConstraintEndpoints {
    fn body_a(&self) -> Option<u32>;
    fn body_b(&self) -> Option<u32>;

    /// A stable id used to index per-constraint bitsets (`jointStateBitSet`, §4.3) and to label
    /// events (`JointEvent::joint_index`, §3.1 ADDED). Defaults to `0` so storages that never
    /// need per-constraint identity (e.g. the `Pair` fixture below) don't have to implement it.
    fn id(&self) -> u32 {
        0
    }
}

/// One color's worth of constraints. Non-overflow colors additionally track which bodies are
/// currently "occupied" so new constraints can be tested for conflicts in O(1).
#[derive(Default)]
pub struct GraphColor<J, C> {
    pub joints: Vec<J>,
    pub contacts: Vec<C>,
    occupied_bodies: FxHashSet<u32>,
}

impl<J, C> GraphColor<J, C> {
    fn new() -> Self {
        Self {
            joints: Vec::new(),
            contacts: Vec::new(),
            occupied_bodies: FxHashSet::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty() && self.contacts.is_empty()
    }

    fn conflicts(&self, c: &impl ConstraintEndpoints) -> bool {
        c.body_a()
            .map_or(false, |b| self.occupied_bodies.contains(&b))
            || c.body_b()
                .map_or(false, |b| self.occupied_bodies.contains(&b))
    }

    fn occupy(&mut self, c: &impl ConstraintEndpoints) {
        if let Some(b) = c.body_a() {
            self.occupied_bodies.insert(b);
        }
        if let Some(b) = c.body_b() {
            self.occupied_bodies.insert(b);
        }
    }
}

/// The full fixed-size palette of colors, the last of which is the overflow color.
pub struct ConstraintGraph<J, C> {
    colors: Vec<GraphColor<J, C>>,
}

impl<J: ConstraintEndpoints, C: ConstraintEndpoints> ConstraintGraph<J, C> {
    pub fn new() -> Self {
        Self {
            colors: (0..GRAPH_COLOR_COUNT).map(|_| GraphColor::new()).collect(),
        }
    }

    pub fn colors(&self) -> &[GraphColor<J, C>] {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut [GraphColor<J, C>] {
        &mut self.colors
    }

    pub fn overflow(&self) -> &GraphColor<J, C> {
        &self.colors[OVERFLOW_COLOR_INDEX]
    }

    pub fn overflow_mut(&mut self) -> &mut GraphColor<J, C> {
        &mut self.colors[OVERFLOW_COLOR_INDEX]
    }

    /// Colors not empty and not the overflow color, in ascending index order — the
    /// `activeColors` iterated by every parallel stage in §4.2's stage ordering.
    pub fn active_color_indices(&self) -> Vec<usize> {
        self.colors[..OVERFLOW_COLOR_INDEX]
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Finds the lowest-index regular color the constraint can join without conflicting with
    /// an already-assigned body, falling back to the overflow color.
    fn find_color_for(&self, c: &impl ConstraintEndpoints) -> usize {
        for (i, color) in self.colors[..OVERFLOW_COLOR_INDEX].iter().enumerate() {
            if !color.conflicts(c) {
                return i;
            }
        }
        OVERFLOW_COLOR_INDEX
    }

    /// Assigns `joint` to a color and returns the color index it landed in.
    pub fn add_joint(&mut self, joint: J) -> usize {
        let idx = self.find_color_for(&joint);
        let color = &mut self.colors[idx];
        if idx != OVERFLOW_COLOR_INDEX {
            color.occupy(&joint);
        }
        color.joints.push(joint);
        idx
    }

    /// Assigns `contact` to a color and returns the color index it landed in.
    pub fn add_contact(&mut self, contact: C) -> usize {
        let idx = self.find_color_for(&contact);
        let color = &mut self.colors[idx];
        if idx != OVERFLOW_COLOR_INDEX {
            color.occupy(&contact);
        }
        color.contacts.push(contact);
        idx
    }

    pub fn clear(&mut self) {
        for color in &mut self.colors {
            color.joints.clear();
            color.contacts.clear();
            color.occupied_bodies.clear();
        }
    }
}

impl<J: ConstraintEndpoints, C: ConstraintEndpoints> Default for ConstraintGraph<J, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Pair(Option<u32>, Option<u32>);
    impl ConstraintEndpoints for Pair {
        fn body_a(&self) -> Option<u32> {
            self.0
        }
        fn body_b(&self) -> Option<u32> {
            self.1
        }
    }

    #[test]
    fn disjoint_constraints_share_a_color() {
        let mut graph: ConstraintGraph<Pair, Pair> = ConstraintGraph::new();
        let c1 = graph.add_joint(Pair(Some(0), Some(1)));
        let c2 = graph.add_joint(Pair(Some(2), Some(3)));
        assert_eq!(c1, 0);
        assert_eq!(c2, 0);
    }

    #[test]
    fn conflicting_constraints_land_in_different_colors() {
        let mut graph: ConstraintGraph<Pair, Pair> = ConstraintGraph::new();
        let c1 = graph.add_joint(Pair(Some(0), Some(1)));
        let c2 = graph.add_joint(Pair(Some(1), Some(2)));
        assert_eq!(c1, 0);
        assert_eq!(c2, 1);
    }

    #[test]
    fn static_anchor_never_blocks_a_color() {
        let mut graph: ConstraintGraph<Pair, Pair> = ConstraintGraph::new();
        // Every joint anchors to the static world frame (`None`) on one side; a static anchor
        // must never register as an occupied body, so these all pack into color 0 even though
        // they repeatedly reference "no body" on that side.
        for _ in 0..5 {
            let idx = graph.add_joint(Pair(None, None));
            assert_eq!(idx, 0, "a None endpoint must never cause a conflict");
        }
        // But a *dynamic* body shared across joints still forces distinct colors.
        let first = graph.add_joint(Pair(None, Some(7)));
        let second = graph.add_joint(Pair(None, Some(7)));
        assert_ne!(first, second);
    }

    #[test]
    fn overflow_color_absorbs_constraints_past_the_palette() {
        let mut graph: ConstraintGraph<Pair, Pair> = ConstraintGraph::new();
        // Chain of joints all touching body 0 forces every regular color to be exhausted.
        for i in 1..(crate::config::GRAPH_COLOR_COUNT as u32 + 5) {
            graph.add_joint(Pair(Some(0), Some(i)));
        }
        assert!(!graph.overflow().joints.is_empty());
    }

    #[test]
    fn non_overflow_colors_are_body_disjoint() {
        let mut graph: ConstraintGraph<Pair, Pair> = ConstraintGraph::new();
        for i in 0..50u32 {
            graph.add_joint(Pair(Some(i), Some(i + 1)));
        }
        for (idx, color) in graph.colors().iter().enumerate() {
            if idx == crate::config::OVERFLOW_COLOR_INDEX {
                continue;
            }
            let mut seen = FxHashSet::default();
            for j in &color.joints {
                for b in [j.body_a(), j.body_b()].into_iter().flatten() {
                    assert!(seen.insert(b), "body {b} repeated in color {idx}");
                }
            }
        }
    }
}
