//! Minimal 2D math shared across the solver, CCD, and sensor modules.
//!
//! Shape math itself lives outside this crate (see [`crate::external`]); this module only
//! carries the small amount of vector/rotation arithmetic the kernels need to integrate
//! velocities and positions and to interpolate a [`Sweep`](crate::ccd::Sweep).

use nalgebra::{UnitComplex, Vector2};

/// The scalar type used throughout the solver. Matches `rapier2d`'s `f32` default build.
pub type Real = f32;

/// A 2D vector.
pub type Vec2 = Vector2<Real>;

/// A 2D rotation, represented as a unit complex number (cheaper to renormalize than an angle).
pub type Rot2 = UnitComplex<Real>;

/// A rigid transform: translation plus rotation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transform2 {
    pub translation: Vec2,
    pub rotation: Rot2,
}

impl Transform2 {
    pub fn new(translation: Vec2, rotation: Rot2) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self {
            translation: Vec2::zeros(),
            rotation: Rot2::identity(),
        }
    }

    /// Transforms a point expressed in local coordinates into world coordinates.
    pub fn transform_point(&self, local: &Vec2) -> Vec2 {
        self.translation + self.rotation * local
    }

    /// Transforms a vector (ignores translation).
    pub fn transform_vector(&self, local: &Vec2) -> Vec2 {
        self.rotation * local
    }

    /// Interpolates linearly between two transforms at `t in [0, 1]`.
    ///
    /// Rotation is interpolated via `nlerp`, a cheap
    /// approximate slerp for sweep interpolation (exact slerp is not needed at
    /// the fractions CCD cares about, and nlerp is branch-free).
    pub fn lerp(&self, other: &Transform2, t: Real) -> Transform2 {
        let translation = self.translation + (other.translation - self.translation) * t;
        let rotation = nlerp(self.rotation, other.rotation, t);
        Transform2::new(translation, rotation)
    }
}

/// Normalized linear interpolation between two rotations.
pub fn nlerp(a: Rot2, b: Rot2, t: Real) -> Rot2 {
    let (ac, as_) = (a.re, a.im);
    let (mut bc, mut bs) = (b.re, b.im);

    // Take the short way around.
    if ac * bc + as_ * bs < 0.0 {
        bc = -bc;
        bs = -bs;
    }

    let c = ac + (bc - ac) * t;
    let s = as_ + (bs - as_) * t;
    UnitComplex::from_cos_sin_unchecked(c, s).normalize()
}

/// Integrates a rotation delta by an angular velocity over `h` seconds, matching the
/// teacher's small-angle rotation update: `q' = normalize(q + h * w * perp(q))`.
pub fn integrate_rotation(q: Rot2, h_times_w: Real) -> Rot2 {
    // d/dt UnitComplex(cos, sin) = w * (-sin, cos); first-order step then renormalize.
    let (c, s) = (q.re, q.im);
    let new_c = c - h_times_w * s;
    let new_s = s + h_times_w * c;
    UnitComplex::from_cos_sin_unchecked(new_c, new_s).normalize()
}

#[inline]
pub fn clamp(v: Real, lo: Real, hi: Real) -> Real {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn lerp_at_zero_and_one_returns_endpoints() {
        let a = Transform2::new(Vec2::new(0.0, 0.0), Rot2::identity());
        let b = Transform2::new(Vec2::new(2.0, 4.0), Rot2::new(1.0));
        assert_eq!(a.lerp(&b, 0.0).translation, a.translation);
        assert_relative_eq!(a.lerp(&b, 1.0).translation, b.translation, epsilon = 1e-5);
    }

    #[test]
    fn integrate_rotation_preserves_unit_length() {
        let q = Rot2::identity();
        let q2 = integrate_rotation(q, 0.3);
        assert_relative_eq!(q2.re * q2.re + q2.im * q2.im, 1.0, epsilon = 1e-6);
    }
}
