//! End-to-end simulation behaviors: density estimation, boundary
//! containment, circle momentum exchange, pull field, empty ticks.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use glam::Vec2;
use sph2d::{
    kernel, CircleDesc, CircleState, FluidParams, FluidSimulation, Particle, RectangleDesc,
};

const DT: f32 = 1.0 / 120.0;

fn calm_params(n: usize) -> FluidParams {
    FluidParams {
        num_particles: n,
        gravity: Vec2::ZERO,
        min_dt: DT,
        ..FluidParams::default()
    }
}

#[test]
fn isolated_particle_density_is_self_term() {
    let mut sim = FluidSimulation::new(calm_params(1), &[], &[]).unwrap();
    sim.set_particle(0, Particle::new(Vec2::ZERO, Vec2::ZERO));
    sim.step(DT, None);

    let mass = sim.params().particle_mass();
    let expected = mass * kernel::self_term(sim.params().influence_radius);
    assert_relative_eq!(sim.densities()[0], expected, max_relative = 1e-6);
}

#[test]
fn four_quadrant_corners_share_density() {
    // Four particles at the quadrant corners of one influence-radius cell,
    // zero velocity, zero gravity. By symmetry every particle sees the same
    // neighborhood: two side neighbors and one diagonal neighbor.
    let params = FluidParams {
        influence_radius: 1.0,
        ..calm_params(4)
    };
    let mut sim = FluidSimulation::new(params, &[], &[]).unwrap();
    let corners = [
        Vec2::new(0.25, 0.25),
        Vec2::new(0.75, 0.25),
        Vec2::new(0.25, 0.75),
        Vec2::new(0.75, 0.75),
    ];
    for (i, &corner) in corners.iter().enumerate() {
        sim.set_particle(i, Particle::new(corner, Vec2::ZERO));
    }
    sim.step(DT, None);

    let radius = sim.params().influence_radius;
    let mass = sim.params().particle_mass();
    let side = 0.5;
    let diagonal = side * std::f32::consts::SQRT_2;
    let expected = mass
        * (kernel::self_term(radius)
            + 2.0 * kernel::spike(side, radius)
            + kernel::spike(diagonal, radius));

    for &density in sim.densities() {
        assert_relative_eq!(density, expected, max_relative = 1e-4);
    }
    let first = sim.densities()[0];
    for &density in &sim.densities()[1..] {
        assert_relative_eq!(density, first, max_relative = 1e-5);
    }
}

#[test]
fn gravity_never_pushes_particles_out_of_bounds() {
    let params = FluidParams {
        num_particles: 64,
        gravity: Vec2::new(0.0, -40.0),
        min_dt: DT,
        ..FluidParams::default()
    };
    let mut sim = FluidSimulation::new(params, &[], &[]).unwrap();

    for _ in 0..240 {
        sim.step(DT, None);
        for &pos in sim.positions() {
            let local = sim.bounds().point_to_local(pos);
            assert!(
                local.x.abs() <= 1.0 + 1e-3 && local.y.abs() <= 1.0 + 1e-3,
                "particle escaped bounds: {pos:?} -> local {local:?}"
            );
        }
    }
}

#[test]
fn circle_impulse_matches_particle_momentum_change() {
    let circle = CircleDesc {
        radius: 1.0,
        mass: 5.0,
    };
    let mut sim = FluidSimulation::new(calm_params(1), &[], &[circle]).unwrap();
    let id = sim.circle_ids().next().unwrap();
    sim.set_circle_state(id, CircleState::default());

    // One particle inside the stationary circle, drifting further in.
    let v_before = Vec2::new(-1.0, 0.3);
    sim.set_particle(0, Particle::new(Vec2::new(0.5, 0.0), v_before));
    sim.step(DT, None);

    let v_after = sim.velocities()[0];
    let delta_v = v_after - v_before;
    assert!(delta_v.length() > 0.0, "contact should change the velocity");

    // force * dt is the impulse handed to the circle; it must be equal and
    // opposite to the particle's momentum change.
    let impulse = sim.circle_force(id) * DT;
    let particle_momentum = delta_v * sim.params().particle_mass();
    assert_relative_eq!(impulse.x, -particle_momentum.x, max_relative = 1e-3);
    assert_relative_eq!(impulse.y, -particle_momentum.y, max_relative = 1e-3);
}

#[test]
fn untouched_circles_receive_no_force() {
    let circles = [
        CircleDesc {
            radius: 1.0,
            mass: 5.0,
        },
        CircleDesc {
            radius: 1.0,
            mass: 5.0,
        },
    ];
    let mut sim = FluidSimulation::new(calm_params(1), &[], &circles).unwrap();
    let ids: Vec<_> = sim.circle_ids().collect();
    sim.set_circle_state(
        ids[0],
        CircleState {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
        },
    );
    sim.set_circle_state(
        ids[1],
        CircleState {
            position: Vec2::new(50.0, 50.0),
            velocity: Vec2::ZERO,
        },
    );
    sim.set_particle(0, Particle::new(Vec2::new(0.4, 0.0), Vec2::new(-1.0, 0.0)));
    sim.step(DT, None);

    assert!(sim.circle_force(ids[0]).length() > 0.0);
    assert_eq!(sim.circle_force(ids[1]), Vec2::ZERO);
}

#[test]
fn empty_simulation_ticks_cleanly() {
    let circle = CircleDesc {
        radius: 1.0,
        mass: 2.0,
    };
    let mut sim = FluidSimulation::new(calm_params(0), &[], &[circle]).unwrap();
    let id = sim.circle_ids().next().unwrap();
    sim.step(DT, Some(Vec2::ZERO));

    assert_eq!(sim.num_particles(), 0);
    assert!(sim.densities().is_empty());
    assert_eq!(sim.circle_force(id), Vec2::ZERO);
    assert_eq!(sim.sample_density(Vec2::ZERO), 0.0);
}

#[test]
fn pull_field_attracts_nearby_particles() {
    let mut sim = FluidSimulation::new(calm_params(1), &[], &[]).unwrap();
    sim.set_particle(0, Particle::new(Vec2::ZERO, Vec2::ZERO));
    sim.step(DT, Some(Vec2::new(1.0, 0.0)));
    assert!(
        sim.velocities()[0].x > 0.0,
        "particle should accelerate toward the pull point"
    );

    // Outside the pull radius the field has no reach.
    let mut far = FluidSimulation::new(calm_params(1), &[], &[]).unwrap();
    far.set_particle(0, Particle::new(Vec2::ZERO, Vec2::ZERO));
    let beyond = far.params().pull_radius + 1.0;
    far.step(DT, Some(Vec2::new(beyond, 0.0)));
    assert_eq!(far.velocities()[0], Vec2::ZERO);
}

#[test]
fn obstacle_rectangle_ejects_penetrating_particle() {
    let obstacle = RectangleDesc {
        position: Vec2::new(0.0, -2.0),
        half_extents: Vec2::new(2.0, 0.5),
        rotation: 0.0,
    };
    let mut sim = FluidSimulation::new(calm_params(1), &[obstacle], &[]).unwrap();
    sim.set_particle(0, Particle::new(Vec2::new(0.0, -1.6), Vec2::new(0.0, -0.5)));
    sim.step(DT, None);

    let pos = sim.positions()[0];
    let local_y = (pos.y - (-2.0)) / 0.5;
    let local_x = pos.x / 2.0;
    assert!(
        local_x.abs() >= 1.0 - 1e-4 || local_y.abs() >= 1.0 - 1e-4,
        "particle still inside obstacle: {pos:?}"
    );
}

#[test]
fn sample_density_tracks_particle_cluster() {
    let params = FluidParams {
        num_particles: 16,
        ..calm_params(16)
    };
    let mut sim = FluidSimulation::new(params, &[], &[]).unwrap();
    for i in 0..16 {
        let angle = i as f32 * std::f32::consts::TAU / 16.0;
        let pos = Vec2::new(angle.cos(), angle.sin()) * 0.2;
        sim.set_particle(i, Particle::new(pos, Vec2::ZERO));
    }
    sim.step(DT, None);

    let near = sim.sample_density(Vec2::ZERO);
    let far = sim.sample_density(Vec2::new(30.0, 30.0));
    assert!(near > 0.0);
    assert_abs_diff_eq!(far, 0.0);
}

#[test]
fn densities_are_symmetric_for_mirrored_pairs() {
    let params = FluidParams {
        influence_radius: 1.0,
        ..calm_params(2)
    };
    let mut sim = FluidSimulation::new(params, &[], &[]).unwrap();
    sim.set_particle(0, Particle::new(Vec2::new(-0.2, 0.0), Vec2::ZERO));
    sim.set_particle(1, Particle::new(Vec2::new(0.2, 0.0), Vec2::ZERO));
    sim.step(DT, None);
    assert_relative_eq!(sim.densities()[0], sim.densities()[1], max_relative = 1e-6);
}
