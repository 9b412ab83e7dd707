//! Axis-aligned bounding boxes, used by the broad-phase contract (§6) and by finalization/CCD
//! AABB refresh (§4.4, §4.5). Shape math itself is external; this is just the small value type
//! the contract is expressed in terms of.

use crate::math::{Real, Vec2};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub mins: Vec2,
    pub maxs: Vec2,
}

impl Aabb {
    pub fn new(mins: Vec2, maxs: Vec2) -> Self {
        debug_assert!(mins.x <= maxs.x && mins.y <= maxs.y);
        Self { mins, maxs }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            mins: Vec2::new(self.mins.x.min(other.mins.x), self.mins.y.min(other.mins.y)),
            maxs: Vec2::new(self.maxs.x.max(other.maxs.x), self.maxs.y.max(other.maxs.y)),
        }
    }

    pub fn inflated(&self, margin: Real) -> Aabb {
        Aabb {
            mins: Vec2::new(self.mins.x - margin, self.mins.y - margin),
            maxs: Vec2::new(self.maxs.x + margin, self.maxs.y + margin),
        }
    }

    /// True if `self` is not fully contained within `fat` — i.e. the tight AABB escaped its
    /// broad-phase fat AABB and the proxy needs enlarging (§4.4 step 6, §4.5).
    pub fn escapes(&self, fat: &Aabb) -> bool {
        self.mins.x < fat.mins.x
            || self.mins.y < fat.mins.y
            || self.maxs.x > fat.maxs.x
            || self.maxs.y > fat.maxs.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.mins.x && p.x <= self.maxs.x && p.y >= self.mins.y && p.y <= self.maxs.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_covers_both_boxes() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(0.5, -1.0), Vec2::new(2.0, 0.5));
        let u = a.union(&b);
        assert_eq!(u.mins, Vec2::new(0.0, -1.0));
        assert_eq!(u.maxs, Vec2::new(2.0, 1.0));
    }

    #[test]
    fn escapes_detects_when_tight_box_leaves_fat_box() {
        let fat = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let tight_inside = Aabb::new(Vec2::new(-0.5, -0.5), Vec2::new(0.5, 0.5));
        let tight_outside = Aabb::new(Vec2::new(-0.5, -0.5), Vec2::new(1.5, 0.5));
        assert!(!tight_inside.escapes(&fat));
        assert!(tight_outside.escapes(&fat));
    }
}
