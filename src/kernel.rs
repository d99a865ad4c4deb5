//! 2D smoothing kernel for SPH density and force estimation.
//!
//! A cubic spike kernel: radially symmetric, maximal at distance zero,
//! exactly zero at and beyond the cutoff radius, and normalized so the
//! integral over the plane is 1.

use std::f32::consts::PI;

/// Kernel weight at distance `dist` for cutoff radius `radius`.
///
/// `w(d) = (1 - d/r)^3 * 10 / (pi r^2)` inside the support, 0 outside.
#[inline]
pub fn spike(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let t = 1.0 - dist / radius;
    t * t * t * 10.0 / (PI * radius * radius)
}

/// Radial derivative of [`spike`] at distance `dist`. Negative inside the
/// support (weight falls off with distance), 0 outside.
#[inline]
pub fn spike_deriv(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let t = 1.0 - dist / radius;
    -t * t * 30.0 / (PI * radius * radius * radius)
}

/// Weight a particle contributes to its own density.
#[inline]
pub fn self_term(radius: f32) -> f32 {
    spike(0.0, radius)
}
