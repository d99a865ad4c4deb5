//! Rigid geometry the fluid collides with.
//!
//! Rectangles (world boundary + static obstacles) are stored as a
//! rotate-scale matrix pair so world<->local point mapping is two matrix
//! multiplies; in local space the rectangle is the unit square [-1, 1]^2,
//! which makes inside tests and edge distances trivial.
//!
//! Circles are dynamic bodies owned by an external physics engine. The
//! simulation reads their state each tick and hands impulses back, keyed by
//! a stable [`CircleId`] assigned at initialization.

use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};

/// Scale below which a rectangle is considered degenerate (zero area).
const MIN_DETERMINANT: f32 = 1e-12;

/// An oriented rectangle described by center, half-extents and rotation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RectangleDesc {
    pub position: Vec2,
    pub half_extents: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
}

/// An oriented rectangle as a transform pair.
///
/// `rs` maps the local unit square to world space (rotation x half-extent
/// scale), `inv_rs` maps world offsets back to local coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Rectangle {
    pub position: Vec2,
    rs: Mat2,
    inv_rs: Mat2,
    /// Zero-area rectangles never collide (kept branch-free elsewhere).
    degenerate: bool,
}

impl Rectangle {
    pub fn new(position: Vec2, half_extents: Vec2, rotation: f32) -> Self {
        let rs = Mat2::from_angle(rotation) * Mat2::from_diagonal(half_extents);
        let degenerate = rs.determinant().abs() < MIN_DETERMINANT;
        let inv_rs = if degenerate { Mat2::ZERO } else { rs.inverse() };
        Self {
            position,
            rs,
            inv_rs,
            degenerate,
        }
    }

    pub fn from_desc(desc: &RectangleDesc) -> Self {
        Self::new(desc.position, desc.half_extents, desc.rotation)
    }

    /// Replace the transform. Used when an obstacle moves between ticks.
    pub fn set_trs(&mut self, position: Vec2, half_extents: Vec2, rotation: f32) {
        *self = Self::new(position, half_extents, rotation);
    }

    /// Map a world point into the rectangle's local unit-square space.
    #[inline]
    pub fn point_to_local(&self, world: Vec2) -> Vec2 {
        self.inv_rs * (world - self.position)
    }

    /// Map a local point back to world space.
    #[inline]
    pub fn point_to_world(&self, local: Vec2) -> Vec2 {
        self.rs * local + self.position
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Whether a world point lies strictly inside the rectangle.
    #[inline]
    pub fn contains(&self, world: Vec2) -> bool {
        if self.degenerate {
            return false;
        }
        let l = self.point_to_local(world);
        l.x.abs() < 1.0 && l.y.abs() < 1.0
    }

    /// Keep a particle inside this rectangle (world-boundary behavior).
    ///
    /// Clamps each escaped local axis to the surface and reflects that
    /// velocity component scaled by `bounciness`. Per-axis last-write-wins,
    /// not an iterative solve.
    pub fn contain(&self, pos: &mut Vec2, vel: &mut Vec2, bounciness: f32) -> bool {
        if self.degenerate {
            return false;
        }
        let mut l = self.point_to_local(*pos);
        if l.x.abs() < 1.0 && l.y.abs() < 1.0 {
            return false;
        }
        let mut lv = self.inv_rs * *vel;
        if l.x.abs() >= 1.0 {
            l.x = l.x.signum();
            lv.x = -lv.x * bounciness;
        }
        if l.y.abs() >= 1.0 {
            l.y = l.y.signum();
            lv.y = -lv.y * bounciness;
        }
        *pos = self.point_to_world(l);
        *vel = self.rs * lv;
        true
    }

    /// Push a penetrating particle out of this rectangle (obstacle
    /// behavior): nearest-edge pushout plus reflection of the local
    /// velocity component along the contact normal.
    pub fn push_out(&self, pos: &mut Vec2, vel: &mut Vec2, bounciness: f32) -> bool {
        if self.degenerate {
            return false;
        }
        let mut l = self.point_to_local(*pos);
        if l.x.abs() >= 1.0 || l.y.abs() >= 1.0 {
            return false;
        }
        // Penetration depth per local axis, scaled to world units so the
        // nearest edge is nearest in world space even for skewed extents.
        let depth_x = (1.0 - l.x.abs()) * self.rs.col(0).length();
        let depth_y = (1.0 - l.y.abs()) * self.rs.col(1).length();
        let mut lv = self.inv_rs * *vel;
        if depth_x <= depth_y {
            l.x = l.x.signum();
            lv.x = -lv.x * bounciness;
        } else {
            l.y = l.y.signum();
            lv.y = -lv.y * bounciness;
        }
        *pos = self.point_to_world(l);
        *vel = self.rs * lv;
        true
    }
}

/// Stable handle for a dynamic rigid circle, assigned at initialization.
///
/// Impulse aggregation is keyed by this handle so iteration order is never
/// a correctness dependency between the simulation and the host engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircleId(pub(crate) u32);

impl CircleId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Initialization description of a dynamic circle body.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CircleDesc {
    pub radius: f32,
    pub mass: f32,
}

/// Immutable per-body circle data, derived once at init.
#[derive(Clone, Copy, Debug)]
pub struct CircleInfo {
    pub radius: f32,
    pub mass: f32,
    /// Area density `mass / (pi r^2)`. Zero-radius circles never collide,
    /// so the division is guarded.
    pub density: f32,
}

impl CircleInfo {
    pub fn new(radius: f32, mass: f32) -> Self {
        let area = std::f32::consts::PI * radius * radius;
        let density = if area > 0.0 { mass / area } else { 0.0 };
        Self {
            radius,
            mass,
            density,
        }
    }
}

/// Per-tick state of a dynamic circle, supplied by the host.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CircleState {
    pub position: Vec2,
    pub velocity: Vec2,
}
