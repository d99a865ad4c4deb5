//! Fluid particles.
//!
//! Particle state is stored index-aligned inside the simulation (structure
//! of arrays); this value type is the public read/spawn surface.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single fluid particle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Particle {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }
}

/// Uniform sample from the unit disk, by rejection.
pub fn random_in_unit_disk<R: Rng>(rng: &mut R) -> Vec2 {
    loop {
        let v = Vec2::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
        if v.length_squared() <= 1.0 {
            return v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_disk_samples_stay_inside() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            assert!(random_in_unit_disk(&mut rng).length() <= 1.0 + 1e-6);
        }
    }
}
