//! Simulation parameters, fixed for the lifetime of a simulation.
//!
//! All tunables live here instead of being scattered across modules.
//! Defaults mirror a stable "water in a box with a boat" configuration.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lookahead used when projecting positions for neighbor search (seconds).
///
/// Deliberately distinct from the integration timestep: the projected
/// position only stabilizes neighbor lists, it never feeds back into the
/// true particle state.
pub const PROJECTION_LOOKAHEAD: f32 = 1.0 / 120.0;

/// Initialization configuration for a [`crate::FluidSimulation`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FluidParams {
    /// Number of particles. Fixed for the simulation's lifetime.
    /// Zero is allowed; every phase degenerates to a no-op.
    pub num_particles: usize,
    /// Total fluid mass; each particle carries `total_mass / num_particles`.
    pub total_mass: f32,
    /// SPH smoothing radius. Also the cell size of the primary lookup.
    pub influence_radius: f32,
    /// Coarser radius for external density-field sampling.
    pub sample_radius: f32,
    /// Rest density the pressure term relaxes toward.
    pub target_density: f32,
    /// Scale from density error to pressure.
    pub pressure_multiplier: f32,
    /// Strength of the velocity-difference damping between neighbors.
    pub viscosity: f32,
    /// Velocity retained along the contact normal after a rectangle hit.
    pub bounciness: f32,
    /// Tangential damping against a circle's surface.
    pub circle_friction: f32,
    /// Repulsion/adhesion strength at a circle's surface.
    pub circle_surface_strength: f32,
    /// Gravity acceleration.
    pub gravity: Vec2,
    /// Requested world extent. Rounded up to a whole, even number of
    /// influence-radius cells per axis so the grid tiles the bounds exactly.
    pub bounds_size: Vec2,
    /// Rotation of the world boundary rectangle (radians).
    pub bounds_rotation: f32,
    /// Radius of the disk particles are seeded into.
    pub start_radius: f32,
    /// Upper bound on the integration timestep (seconds). The tick uses
    /// `min(min_dt, elapsed)` to bound worst-case integration error.
    pub min_dt: f32,
    /// Radius of the external pull force field.
    pub pull_radius: f32,
    /// Peak acceleration of the pull force field.
    pub pull_strength: f32,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            num_particles: 1024,
            total_mass: 1000.0,
            influence_radius: 0.5,
            sample_radius: 1.0,
            target_density: 70.0,
            pressure_multiplier: 500.0,
            viscosity: 0.3,
            bounciness: 0.3,
            circle_friction: 1.0,
            circle_surface_strength: 5000.0,
            gravity: Vec2::new(0.0, -9.8),
            bounds_size: Vec2::new(16.0, 9.0),
            bounds_rotation: 0.0,
            start_radius: 3.0,
            min_dt: 1.0 / 120.0,
            pull_radius: 2.0,
            pull_strength: 30.0,
        }
    }
}

/// Fatal initialization errors. No partial simulation is produced.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("influence radius must be positive, got {0}")]
    InfluenceRadius(f32),
    #[error("sample radius must be positive, got {0}")]
    SampleRadius(f32),
    #[error("minimum timestep must be positive, got {0}")]
    MinDt(f32),
    #[error("world bounds must have positive extent, got {0}x{1}")]
    BoundsSize(f32, f32),
}

impl FluidParams {
    /// Mass of a single particle.
    #[inline]
    pub fn particle_mass(&self) -> f32 {
        if self.num_particles == 0 {
            0.0
        } else {
            self.total_mass / self.num_particles as f32
        }
    }

    /// Number of influence-radius cells the world boundary spans per axis.
    ///
    /// Rounded up, then forced even, so the boundary aligns to whole grid
    /// cells and no cell straddles the simulation edge.
    pub fn bounds_cells(&self) -> (i32, i32) {
        let round = |extent: f32| -> i32 {
            let n = (extent / self.influence_radius) as i32 + 1;
            if n % 2 == 0 {
                n
            } else {
                n + 1
            }
        };
        (round(self.bounds_size.x), round(self.bounds_size.y))
    }

    /// Half-extents of the world boundary rectangle, in world units.
    pub fn bounds_half_extents(&self) -> Vec2 {
        let (cx, cy) = self.bounds_cells();
        Vec2::new(cx as f32, cy as f32) * self.influence_radius * 0.5
    }

    /// Check the configuration. Called by `FluidSimulation::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.influence_radius > 0.0) {
            return Err(ConfigError::InfluenceRadius(self.influence_radius));
        }
        if !(self.sample_radius > 0.0) {
            return Err(ConfigError::SampleRadius(self.sample_radius));
        }
        if !(self.min_dt > 0.0) {
            return Err(ConfigError::MinDt(self.min_dt));
        }
        if !(self.bounds_size.x > 0.0 && self.bounds_size.y > 0.0) {
            return Err(ConfigError::BoundsSize(self.bounds_size.x, self.bounds_size.y));
        }
        Ok(())
    }
}
