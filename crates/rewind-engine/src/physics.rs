//! rapier2d physics integration with rewindable rigid bodies.
//!
//! The [`PhysicsWorld`] owns a rapier2d simulation keyed by [`BodyId`]. A
//! [`RigidBodyTarget`] exposes one body to the timeline as a
//! [`Rewindable`], so its pose and velocities are recorded every tick and
//! restored on rewind:
//!
//! - **Pause** freezes the body (kinematic, position-driven) so the solver
//!   leaves it alone while the host scrubs.
//! - **Replication** moves the body to the recorded pose and keeps it
//!   frozen. Velocities are not touched because the result is display only.
//! - **Simulate** moves the body to the recorded pose and restores its
//!   frozen flag and velocities so simulation continues exactly from there.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Combined with a fixed
//! timestep and sorted collision output, stepping is deterministic on the
//! same platform.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::change::{Angle, Changed};
use crate::recorder::{ApplySource, Rewindable};

// ---------------------------------------------------------------------------
// Body descriptors
// ---------------------------------------------------------------------------

/// 2D position of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// 2D linear velocity of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    /// Horizontal velocity.
    pub dx: f64,
    /// Vertical velocity.
    pub dy: f64,
}

impl Changed for Position {
    fn changed(&self, other: &Self) -> bool {
        [self.x, self.y].changed(&[other.x, other.y])
    }
}

impl Changed for Velocity {
    fn changed(&self, other: &Self) -> bool {
        [self.dx, self.dy].changed(&[other.dx, other.dy])
    }
}

/// Physics body type. Determines how rapier treats the body when it is not
/// frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicsBodyType {
    /// Fully simulated by physics (e.g., ball).
    Dynamic,
    /// Moved by game logic through its velocity (e.g., paddle).
    Kinematic,
    /// Immovable (e.g., walls).
    Static,
}

impl PhysicsBodyType {
    fn rigid_body_type(self) -> RigidBodyType {
        match self {
            PhysicsBodyType::Dynamic => RigidBodyType::Dynamic,
            PhysicsBodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
            PhysicsBodyType::Static => RigidBodyType::Fixed,
        }
    }
}

/// Collider shape for physics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    /// Axis-aligned box with half-extents.
    Box {
        /// Half-width along the x-axis.
        half_width: f64,
        /// Half-height along the y-axis.
        half_height: f64,
    },
    /// Circle with radius.
    Circle {
        /// Radius of the circle.
        radius: f64,
    },
}

/// Physics body descriptor used when adding a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    /// What type of body this is (Dynamic, Kinematic, or Static).
    pub body_type: PhysicsBodyType,
    /// The collider shape.
    pub collider: ColliderShape,
    /// Coefficient of restitution (bounciness). 0.0 = no bounce, 1.0 = perfect bounce.
    pub restitution: f64,
    /// Whether this body is a sensor (detects collisions but doesn't respond physically).
    pub is_sensor: bool,
}

// ---------------------------------------------------------------------------
// BodyId / BodyState / CollisionPair
// ---------------------------------------------------------------------------

/// Stable identifier of a body in a [`PhysicsWorld`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Recorded physical state of one body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    /// Whether the body was frozen (kinematic, position-driven).
    pub frozen: bool,
    /// Translation.
    pub position: Position,
    /// Orientation.
    pub rotation: Angle,
    /// Linear velocity.
    pub velocity: Velocity,
    /// Angular velocity in radians per second.
    pub angular_velocity: f64,
}

impl Changed for BodyState {
    fn changed(&self, other: &Self) -> bool {
        self.frozen.changed(&other.frozen)
            || self.position.changed(&other.position)
            || self.velocity.changed(&other.velocity)
            || self.rotation.changed(&other.rotation)
            || self.angular_velocity.changed(&other.angular_velocity)
    }
}

/// Two bodies that started touching during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionPair {
    /// First body in the collision.
    pub body_a: BodyId,
    /// Second body in the collision.
    pub body_b: BodyId,
}

impl CollisionPair {
    /// Returns `true` if `body` is one of the pair.
    pub fn involves(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

struct BodyEntry {
    handle: RigidBodyHandle,
    base: PhysicsBodyType,
    frozen: bool,
}

/// Manages rapier2d simulation state.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    next_id: u64,
    bodies: HashMap<BodyId, BodyEntry>,
    /// Maps rapier ColliderHandle -> BodyId for collision lookup.
    collider_to_body: HashMap<ColliderHandle, BodyId>,
}

impl PhysicsWorld {
    /// Create a new physics world with the given gravity vector.
    pub fn new(gravity_x: f64, gravity_y: f64) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity_x as Real, gravity_y as Real],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            next_id: 0,
            bodies: HashMap::new(),
            collider_to_body: HashMap::new(),
        }
    }

    /// Create a new physics world with zero gravity.
    pub fn new_zero_gravity() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Add a body with one collider and return its id.
    pub fn add_body(
        &mut self,
        position: &Position,
        velocity: &Velocity,
        body: &PhysicsBody,
    ) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;

        let mut builder = RigidBodyBuilder::new(body.body_type.rigid_body_type())
            .translation(vector![position.x as Real, position.y as Real]);
        if body.body_type != PhysicsBodyType::Static {
            builder = builder.linvel(vector![velocity.dx as Real, velocity.dy as Real]);
        }
        let handle = self.rigid_body_set.insert(builder.build());

        let shape: SharedShape = match &body.collider {
            ColliderShape::Box {
                half_width,
                half_height,
            } => SharedShape::cuboid(*half_width as Real, *half_height as Real),
            ColliderShape::Circle { radius } => SharedShape::ball(*radius as Real),
        };

        let collider = ColliderBuilder::new(shape)
            .restitution(body.restitution as Real)
            .sensor(body.is_sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();

        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        self.collider_to_body.insert(collider_handle, id);
        self.bodies.insert(
            id,
            BodyEntry {
                handle,
                base: body.body_type,
                frozen: false,
            },
        );
        id
    }

    /// Remove a body and its colliders. Returns `false` if `id` is unknown.
    pub fn remove_body(&mut self, id: BodyId) -> bool {
        let Some(entry) = self.bodies.remove(&id) else {
            return false;
        };
        self.rigid_body_set.remove(
            entry.handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.collider_to_body.retain(|_, body| *body != id);
        true
    }

    /// Returns `true` if `id` is in the world.
    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    /// Number of bodies in the world.
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    /// Step the simulation by `dt` seconds.
    ///
    /// Returns the collision pairs that started during the step, sorted by
    /// body id.
    pub fn step(&mut self, dt: f64) -> Vec<CollisionPair> {
        self.integration_params.dt = dt as Real;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        let mut collisions = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            if let CollisionEvent::Started(h1, h2, _flags) = event {
                let body_a = self.collider_to_body.get(&h1).copied();
                let body_b = self.collider_to_body.get(&h2).copied();
                if let (Some(a), Some(b)) = (body_a, body_b) {
                    collisions.push(CollisionPair {
                        body_a: a.min(b),
                        body_b: a.max(b),
                    });
                }
            }
        }

        // Channel delivery order is not guaranteed.
        collisions.sort_by_key(|c| (c.body_a, c.body_b));
        collisions
    }

    /// Current position of `id`.
    pub fn position(&self, id: BodyId) -> Option<Position> {
        let rb = self.rigid_body(id)?;
        let translation = rb.translation();
        Some(Position {
            x: translation.x as f64,
            y: translation.y as f64,
        })
    }

    /// Current linear velocity of `id`.
    pub fn velocity(&self, id: BodyId) -> Option<Velocity> {
        let rb = self.rigid_body(id)?;
        let linvel = rb.linvel();
        Some(Velocity {
            dx: linvel.x as f64,
            dy: linvel.y as f64,
        })
    }

    /// Whether `id` is currently frozen.
    pub fn is_frozen(&self, id: BodyId) -> bool {
        self.bodies.get(&id).is_some_and(|entry| entry.frozen)
    }

    /// Whether `id` currently takes part in the simulation.
    pub fn is_enabled(&self, id: BodyId) -> bool {
        self.rigid_body(id).is_some_and(|rb| rb.is_enabled())
    }

    /// Read the full recorded state of `id`.
    pub fn body_state(&self, id: BodyId) -> Option<BodyState> {
        let entry = self.bodies.get(&id)?;
        let rb = self.rigid_body_set.get(entry.handle)?;
        let translation = rb.translation();
        let linvel = rb.linvel();
        Some(BodyState {
            frozen: entry.frozen,
            position: Position {
                x: translation.x as f64,
                y: translation.y as f64,
            },
            rotation: Angle(rb.rotation().angle() as f64),
            velocity: Velocity {
                dx: linvel.x as f64,
                dy: linvel.y as f64,
            },
            angular_velocity: rb.angvel() as f64,
        })
    }

    /// Restore a recorded state onto `id`.
    ///
    /// [`ApplySource::Replication`] only moves the body and keeps it frozen.
    /// [`ApplySource::Simulate`] also restores the frozen flag and the
    /// velocities. Returns `false` if `id` is unknown.
    pub fn apply_body_state(&mut self, id: BodyId, state: &BodyState, source: ApplySource) -> bool {
        let frozen = match source {
            ApplySource::Replication => true,
            ApplySource::Simulate => state.frozen,
        };
        if !self.freeze(id, frozen) {
            return false;
        }
        let Some(rb) = self.rigid_body_mut(id) else {
            return false;
        };

        rb.set_translation(
            vector![state.position.x as Real, state.position.y as Real],
            true,
        );
        rb.set_rotation(Rotation::new(state.rotation.0 as Real), true);

        if source == ApplySource::Simulate {
            rb.set_linvel(
                vector![state.velocity.dx as Real, state.velocity.dy as Real],
                true,
            );
            rb.set_angvel(state.angular_velocity as Real, true);
        }
        true
    }

    /// Freeze `id` in place, or return it to its own body type. Returns
    /// `false` if `id` is unknown.
    pub fn freeze(&mut self, id: BodyId, frozen: bool) -> bool {
        let Some(entry) = self.bodies.get_mut(&id) else {
            return false;
        };
        if entry.frozen == frozen {
            return true;
        }
        let Some(rb) = self.rigid_body_set.get_mut(entry.handle) else {
            return false;
        };
        let body_type = if frozen {
            RigidBodyType::KinematicPositionBased
        } else {
            entry.base.rigid_body_type()
        };
        rb.set_body_type(body_type, true);
        entry.frozen = frozen;
        true
    }

    /// Enable or disable `id` in the simulation. Disabled bodies neither move
    /// nor collide. Returns `false` if `id` is unknown.
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) -> bool {
        match self.rigid_body_mut(id) {
            Some(rb) => {
                rb.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    fn rigid_body(&self, id: BodyId) -> Option<&RigidBody> {
        let entry = self.bodies.get(&id)?;
        self.rigid_body_set.get(entry.handle)
    }

    fn rigid_body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        let entry = self.bodies.get(&id)?;
        self.rigid_body_set.get_mut(entry.handle)
    }
}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &(self.gravity.x, self.gravity.y))
            .field("bodies", &self.bodies.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RigidBodyTarget
// ---------------------------------------------------------------------------

/// One body of a shared [`PhysicsWorld`], recorded by the timeline.
///
/// Recording a body that has been removed from the world stores `None`;
/// applying `None` leaves the world untouched.
#[derive(Debug, Clone)]
pub struct RigidBodyTarget {
    world: Rc<RefCell<PhysicsWorld>>,
    body: BodyId,
}

impl RigidBodyTarget {
    /// Record `body` in `world`.
    pub fn new(world: Rc<RefCell<PhysicsWorld>>, body: BodyId) -> Self {
        Self { world, body }
    }

    /// The recorded body.
    pub fn body(&self) -> BodyId {
        self.body
    }
}

impl Rewindable for RigidBodyTarget {
    type State = Option<BodyState>;

    fn capture_state(&self) -> Option<BodyState> {
        self.world.borrow().body_state(self.body)
    }

    fn apply_state(&mut self, state: &Option<BodyState>, source: ApplySource) {
        if let Some(state) = state {
            self.world
                .borrow_mut()
                .apply_body_state(self.body, state, source);
        }
    }

    fn has_changed(&self, previous: &Option<BodyState>, current: &Option<BodyState>) -> bool {
        previous.changed(current)
    }

    fn on_pause(&mut self) {
        self.world.borrow_mut().freeze(self.body, true);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
