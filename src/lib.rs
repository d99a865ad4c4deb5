//! 2D SPH fluid simulation with rigid-body coupling.
//!
//! Smoothed-particle hydrodynamics on a fixed particle set, rebuilt-per-tick
//! spatial hashing for O(1) neighbor queries, and impulse accounting against
//! external rigid bodies (static rectangles, dynamic circles).
//!
//! The per-tick pipeline runs as a fixed sequence of data-parallel phases
//! (rayon, one lane per particle) with a full barrier between phases:
//!
//! 1. Project positions (velocity extrapolation for stable neighbor lists)
//! 2. Rebuild both spatial lookups (influence radius + sample radius)
//! 3. Estimate densities
//! 4. Integrate particles (pressure, viscosity, body forces, collisions)
//! 5. Aggregate collision impulses per circle
//!
//! This crate is framework-agnostic - it handles simulation only. The host
//! feeds in rigid circle states each tick and reads back the forces to apply
//! to its physics engine.
//!
//! # Example
//!
//! ```
//! use sph2d::{FluidParams, FluidSimulation};
//!
//! let params = FluidParams {
//!     num_particles: 256,
//!     ..FluidParams::default()
//! };
//! let mut sim = FluidSimulation::new(params, &[], &[]).unwrap();
//!
//! // Run a few ticks at 60 FPS
//! for _ in 0..10 {
//!     sim.step(1.0 / 60.0, None);
//! }
//! ```

pub mod geometry;
pub mod kernel;
pub mod params;
pub mod particle;
pub mod simulation;
pub mod spatial;

pub use geometry::{CircleDesc, CircleId, CircleInfo, CircleState, RectangleDesc, Rectangle};
pub use params::{ConfigError, FluidParams};
pub use particle::Particle;
pub use simulation::{CollisionImpulse, FluidSimulation};
pub use spatial::SpatialLookup;
