//! Fluid simulation driver.
//!
//! Owns all per-tick buffers (sized once, reused in place) and runs the
//! fixed phase sequence: project positions, rebuild both spatial lookups,
//! estimate densities, integrate particles, aggregate collision impulses.
//! Phases execute strictly in order; each rayon pass is a full barrier, so
//! a phase only ever reads fully-committed outputs of earlier phases.
//!
//! The integrate phase is double-buffered: every lane reads the previous
//! tick's positions/velocities and this tick's finalized densities, and
//! writes only its own slots of the `next_*` buffers, which are swapped in
//! at the end. No lane ever observes another lane's half-updated state.

use glam::Vec2;
use rayon::prelude::*;

use crate::geometry::{
    CircleDesc, CircleId, CircleInfo, CircleState, Rectangle, RectangleDesc,
};
use crate::kernel;
use crate::params::{ConfigError, FluidParams, PROJECTION_LOOKAHEAD};
use crate::particle::{random_in_unit_disk, Particle};
use crate::spatial::SpatialLookup;

/// Distance below which directions are considered degenerate.
const MIN_DISTANCE: f32 = 1e-6;

/// Fallback separation direction for exactly coincident particles.
const COINCIDENT_DIR: Vec2 = Vec2::X;

/// Per-particle record of a collision against a dynamic circle this tick.
///
/// One slot per particle; if a particle overlaps two circles in the same
/// tick the later circle overwrites the earlier one. Consumed and reset by
/// the driver after aggregation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionImpulse {
    /// Impulse to apply to the circle (reaction to the particle's kick).
    pub impulse: Vec2,
    /// Circle slot index, or -1 when no contact happened.
    pub circle: i32,
}

impl CollisionImpulse {
    pub const NONE: Self = Self {
        impulse: Vec2::ZERO,
        circle: -1,
    };
}

impl Default for CollisionImpulse {
    fn default() -> Self {
        Self::NONE
    }
}

/// 2D SPH fluid coupled to rigid rectangles and circles.
pub struct FluidSimulation {
    params: FluidParams,
    particle_mass: f32,

    // Particle state, index-aligned across all arrays.
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    /// Velocity-extrapolated positions used only for neighbor search.
    proj_positions: Vec<Vec2>,
    densities: Vec<f32>,

    // Integrate-phase output buffers, swapped in after the parallel pass.
    next_positions: Vec<Vec2>,
    next_velocities: Vec<Vec2>,
    collisions: Vec<CollisionImpulse>,

    /// Rigid rectangles; slot 0 is the world boundary, the rest obstacles.
    rectangles: Vec<Rectangle>,
    circle_info: Vec<CircleInfo>,
    circle_states: Vec<CircleState>,
    /// Aggregated per-circle force of the last tick, indexed by CircleId.
    circle_forces: Vec<Vec2>,

    /// Neighbor index at the SPH influence radius.
    lookup: SpatialLookup,
    /// Independent coarser index for external density-field sampling.
    sample_lookup: SpatialLookup,
}

impl FluidSimulation {
    /// Build a simulation. Fails on invalid configuration; no partial
    /// simulation object is produced.
    ///
    /// Particles are seeded uniformly inside `start_radius` with unit-disk
    /// velocities. `rectangles` become static obstacles (the world boundary
    /// is derived from the params and always occupies slot 0); `circles`
    /// get stable ids in argument order, retrievable via [`Self::circle_ids`].
    pub fn new(
        params: FluidParams,
        rectangles: &[RectangleDesc],
        circles: &[CircleDesc],
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        let n = params.num_particles;

        let mut rng = rand::thread_rng();
        let mut positions = Vec::with_capacity(n);
        let mut velocities = Vec::with_capacity(n);
        for _ in 0..n {
            positions.push(random_in_unit_disk(&mut rng) * params.start_radius);
            velocities.push(random_in_unit_disk(&mut rng));
        }

        let bounds = Rectangle::new(
            Vec2::ZERO,
            params.bounds_half_extents(),
            params.bounds_rotation,
        );
        let mut all_rectangles = Vec::with_capacity(rectangles.len() + 1);
        all_rectangles.push(bounds);
        all_rectangles.extend(rectangles.iter().map(Rectangle::from_desc));

        let circle_info: Vec<CircleInfo> = circles
            .iter()
            .map(|c| CircleInfo::new(c.radius, c.mass))
            .collect();

        let (cells_x, cells_y) = params.bounds_cells();
        log::debug!(
            "fluid sim: {n} particles, grid {cells_x}x{cells_y} cells at r={}, \
             {} obstacle(s), {} circle(s)",
            params.influence_radius,
            rectangles.len(),
            circles.len(),
        );

        Ok(Self {
            particle_mass: params.particle_mass(),
            proj_positions: positions.clone(),
            densities: vec![0.0; n],
            next_positions: vec![Vec2::ZERO; n],
            next_velocities: vec![Vec2::ZERO; n],
            collisions: vec![CollisionImpulse::NONE; n],
            rectangles: all_rectangles,
            circle_states: vec![CircleState::default(); circles.len()],
            circle_forces: vec![Vec2::ZERO; circles.len()],
            circle_info,
            lookup: SpatialLookup::new(n, params.influence_radius),
            sample_lookup: SpatialLookup::new(n, params.sample_radius),
            positions,
            velocities,
            params,
        })
    }

    #[inline]
    pub fn num_particles(&self) -> usize {
        self.positions.len()
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    /// Read-only particle positions, for an external renderer.
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    /// Read-only particle velocities.
    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    /// Densities of the last completed tick.
    pub fn densities(&self) -> &[f32] {
        &self.densities
    }

    pub fn particle(&self, index: usize) -> Particle {
        Particle::new(self.positions[index], self.velocities[index])
    }

    /// Overwrite one particle's state (host-side spawning, tests).
    pub fn set_particle(&mut self, index: usize, particle: Particle) {
        self.positions[index] = particle.position;
        self.velocities[index] = particle.velocity;
        self.proj_positions[index] = particle.position;
    }

    /// The world boundary rectangle (slot 0).
    pub fn bounds(&self) -> &Rectangle {
        &self.rectangles[0]
    }

    /// Refresh an obstacle rectangle's transform (obstacle 0 is the first
    /// rectangle passed at construction; the boundary is not addressable).
    pub fn set_obstacle(&mut self, index: usize, desc: RectangleDesc) {
        self.rectangles[index + 1].set_trs(desc.position, desc.half_extents, desc.rotation);
    }

    /// Stable ids of the dynamic circles, in construction order.
    pub fn circle_ids(&self) -> impl Iterator<Item = CircleId> {
        (0..self.circle_info.len() as u32).map(CircleId)
    }

    /// Feed a circle's current state from the external physics engine.
    pub fn set_circle_state(&mut self, id: CircleId, state: CircleState) {
        self.circle_states[id.index()] = state;
    }

    /// Force to apply to a circle body for the last tick (impulse sum over
    /// that tick, divided by its timestep).
    pub fn circle_force(&self, id: CircleId) -> Vec2 {
        self.circle_forces[id.index()]
    }

    /// Per-circle forces of the last tick, keyed by stable id.
    pub fn circle_forces(&self) -> impl Iterator<Item = (CircleId, Vec2)> + '_ {
        self.circle_forces
            .iter()
            .enumerate()
            .map(|(i, &f)| (CircleId(i as u32), f))
    }

    /// Density of the fluid at an arbitrary point, using the coarser
    /// sample-radius index. This is the read surface an external renderer
    /// samples into a texture.
    pub fn sample_density(&self, point: Vec2) -> f32 {
        let radius = self.params.sample_radius;
        let mass = self.particle_mass;
        let mut density = 0.0;
        self.sample_lookup
            .for_each_in_radius(point, &self.proj_positions, |_, dist_sq| {
                density += mass * kernel::spike(dist_sq.sqrt(), radius);
            });
        density
    }

    /// Advance one tick.
    ///
    /// `elapsed` is real time since the last tick; the integration timestep
    /// is `min(min_dt, elapsed)` so frame-rate spikes cannot blow up the
    /// integration error. `pull` is the external attraction point, if any.
    pub fn step(&mut self, elapsed: f32, pull: Option<Vec2>) {
        let dt = self.params.min_dt.min(elapsed);
        if !(dt > 0.0) {
            return;
        }
        if dt < elapsed {
            log::trace!("tick dt clamped: {elapsed} -> {dt}");
        }

        self.circle_forces.iter_mut().for_each(|f| *f = Vec2::ZERO);
        if self.positions.is_empty() {
            return;
        }

        self.project_positions();
        self.sample_lookup.build(&self.proj_positions);
        self.lookup.build(&self.proj_positions);
        self.estimate_densities();
        self.integrate(dt, pull);
        self.aggregate_impulses(dt);
    }

    /// Phase 1: short-horizon predicted positions for neighbor search.
    /// Write-once per tick, read-only afterwards; never fed back into the
    /// true particle state.
    fn project_positions(&mut self) {
        let positions = &self.positions;
        let velocities = &self.velocities;
        self.proj_positions
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, proj)| {
                *proj = positions[i] + velocities[i] * PROJECTION_LOOKAHEAD;
            });
    }

    /// Phase 3: kernel-weighted density per particle over the 3x3 cell
    /// block, self-term included.
    fn estimate_densities(&mut self) {
        let lookup = &self.lookup;
        let proj = &self.proj_positions;
        let mass = self.particle_mass;
        let radius = self.params.influence_radius;
        self.densities
            .par_iter_mut()
            .zip(proj.par_iter())
            .for_each(|(density, &point)| {
                let mut sum = 0.0;
                lookup.for_each_in_radius(point, proj, |_, dist_sq| {
                    sum += mass * kernel::spike(dist_sq.sqrt(), radius);
                });
                *density = sum;
            });
    }

    /// Phases 4-5: forces, velocity/position integration, rigid collision
    /// resolution, collision-impulse recording. One independent lane per
    /// particle; lanes read only previous-tick state and this tick's
    /// finalized densities.
    fn integrate(&mut self, dt: f32, pull: Option<Vec2>) {
        let FluidSimulation {
            params,
            particle_mass,
            positions,
            velocities,
            proj_positions,
            densities,
            next_positions,
            next_velocities,
            collisions,
            rectangles,
            circle_info,
            circle_states,
            lookup,
            ..
        } = self;

        // Reborrow shared inputs immutably so the parallel closure only
        // captures Sync references; the next_* buffers stay exclusive.
        let positions: &[Vec2] = positions;
        let velocities: &[Vec2] = velocities;
        let densities: &[f32] = densities;
        let proj: &[Vec2] = proj_positions;
        let rectangles: &[Rectangle] = rectangles;
        let circle_info: &[CircleInfo] = circle_info;
        let circle_states: &[CircleState] = circle_states;
        let lookup: &SpatialLookup = lookup;

        let mass = *particle_mass;
        let radius = params.influence_radius;
        let target_density = params.target_density;
        let pressure_multiplier = params.pressure_multiplier;
        let viscosity = params.viscosity;
        let bounciness = params.bounciness;
        let circle_friction = params.circle_friction;
        let surface_strength = params.circle_surface_strength;
        let gravity = params.gravity;
        let pull_radius = params.pull_radius;
        let pull_strength = params.pull_strength;

        next_positions
            .par_iter_mut()
            .zip(next_velocities.par_iter_mut())
            .zip(collisions.par_iter_mut())
            .enumerate()
            .for_each(|(i, ((next_pos, next_vel), collision))| {
                let point = proj[i];
                let density_i = densities[i];
                let pressure_i = (density_i - target_density) * pressure_multiplier;

                // 1-2. Pairwise pressure and viscosity over the neighbor list.
                let mut pressure_force = Vec2::ZERO;
                let mut viscosity_force = Vec2::ZERO;
                lookup.for_each_in_radius(point, proj, |j, dist_sq| {
                    if j == i {
                        return;
                    }
                    let dist = dist_sq.sqrt();
                    let dir = if dist > MIN_DISTANCE {
                        (proj[j] - point) / dist
                    } else {
                        COINCIDENT_DIR
                    };
                    let density_j = densities[j];
                    if density_j > 0.0 {
                        let pressure_j = (density_j - target_density) * pressure_multiplier;
                        let shared = 0.5 * (pressure_i + pressure_j);
                        pressure_force +=
                            dir * (shared * kernel::spike_deriv(dist, radius) * mass / density_j);
                    }
                    viscosity_force += (velocities[j] - velocities[i]) * kernel::spike(dist, radius);
                });
                viscosity_force *= viscosity;

                // 3. Body forces: gravity plus the pull field.
                let mut accel = gravity;
                if density_i > 0.0 {
                    accel += (pressure_force + viscosity_force) / density_i;
                }
                if let Some(pull_point) = pull {
                    let to_pull = pull_point - positions[i];
                    let dist = to_pull.length();
                    if dist < pull_radius && dist > MIN_DISTANCE {
                        accel += to_pull / dist * ((1.0 - dist / pull_radius) * pull_strength);
                    }
                }

                // 4. Integrate velocity, then tentative position.
                let mut vel = velocities[i] + accel * dt;
                let mut pos = positions[i] + vel * dt;

                // 5. Rectangles: boundary keeps particles in, obstacles
                // push them out, in fixed order.
                rectangles[0].contain(&mut pos, &mut vel, bounciness);
                for rect in &rectangles[1..] {
                    rect.push_out(&mut pos, &mut vel, bounciness);
                }

                // 6. Circles: surface repulsion plus tangential friction;
                // the reaction impulse lands in this particle's slot
                // (later circle overwrites earlier, single-slot contract).
                *collision = CollisionImpulse::NONE;
                for (c, (info, state)) in
                    circle_info.iter().zip(circle_states.iter()).enumerate()
                {
                    let offset = pos - state.position;
                    let dist = offset.length();
                    if dist >= info.radius || dist <= MIN_DISTANCE {
                        continue;
                    }
                    let normal = offset / dist;
                    let v_rel = vel - state.velocity;
                    let tangential = v_rel - normal * v_rel.dot(normal);
                    let contact_accel = normal
                        * (surface_strength * (1.0 - dist / info.radius) * info.density)
                        - tangential * circle_friction;
                    let dv = contact_accel * dt;
                    vel += dv;
                    *collision = CollisionImpulse {
                        impulse: -dv * mass,
                        circle: c as i32,
                    };
                }

                // 7. Commit.
                *next_vel = vel;
                *next_pos = pos;
            });

        std::mem::swap(&mut self.positions, &mut self.next_positions);
        std::mem::swap(&mut self.velocities, &mut self.next_velocities);
    }

    /// Driver tail: sum impulses per circle, divide by the tick's timestep
    /// to get the force for the external engine, reset the slots.
    fn aggregate_impulses(&mut self, dt: f32) {
        for slot in &mut self.collisions {
            if slot.circle >= 0 {
                self.circle_forces[slot.circle as usize] += slot.impulse;
            }
            *slot = CollisionImpulse::NONE;
        }
        let inv_dt = 1.0 / dt;
        for force in &mut self.circle_forces {
            *force *= inv_dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_params(n: usize) -> FluidParams {
        FluidParams {
            num_particles: n,
            gravity: Vec2::ZERO,
            ..FluidParams::default()
        }
    }

    #[test]
    fn construction_rejects_bad_config() {
        let params = FluidParams {
            influence_radius: -1.0,
            ..FluidParams::default()
        };
        assert!(FluidSimulation::new(params, &[], &[]).is_err());
    }

    #[test]
    fn projection_is_velocity_extrapolation() {
        let mut sim = FluidSimulation::new(quiet_params(1), &[], &[]).unwrap();
        sim.set_particle(0, Particle::new(Vec2::new(1.0, 2.0), Vec2::new(3.0, -1.0)));
        sim.project_positions();
        let expected = Vec2::new(1.0, 2.0) + Vec2::new(3.0, -1.0) * PROJECTION_LOOKAHEAD;
        assert_eq!(sim.proj_positions[0], expected);
    }

    #[test]
    fn timestep_is_clamped_to_min_dt() {
        let mut sim = FluidSimulation::new(quiet_params(1), &[], &[]).unwrap();
        sim.set_particle(0, Particle::new(Vec2::ZERO, Vec2::new(1.0, 0.0)));
        // A huge frame spike must integrate as min_dt, not as elapsed.
        sim.step(10.0, None);
        let moved = sim.positions()[0].length();
        assert!(moved <= sim.params().min_dt * 1.5 + 1e-4, "moved {moved}");
    }

    #[test]
    fn zero_elapsed_is_a_no_op() {
        let mut sim = FluidSimulation::new(quiet_params(4), &[], &[]).unwrap();
        let before = sim.positions().to_vec();
        sim.step(0.0, None);
        assert_eq!(sim.positions(), &before[..]);
    }
}
