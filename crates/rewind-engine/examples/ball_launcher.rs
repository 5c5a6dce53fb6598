//! Headless ball launcher -- launch balls, let them bounce and expire, then
//! scrub back in time and resume from the past.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example ball_launcher -p rewind-engine
//!
//! Each "click" launches a ball and bumps a click counter. A ball that hits
//! something despawns two seconds later. Halfway through the run the timeline
//! pauses, scrubs across the recorded window, and resumes from an earlier
//! tick: balls launched after that tick are destroyed, balls that expired
//! after it come back.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rewind_engine::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Seconds a ball survives after its first collision.
const DESPAWN_DELAY: f64 = 2.0;
/// Frames between launches.
const LAUNCH_INTERVAL: u32 = 40;
/// Frames to run in total.
const FRAMES: u32 = 900;
/// Frame at which the demo pauses and rewinds.
const REWIND_FRAME: u32 = 450;

// ---------------------------------------------------------------------------
// Scene objects
// ---------------------------------------------------------------------------

/// A launched projectile and its recorded parts.
struct Ball {
    name: String,
    body: BodyId,
    entity: Attached<TimeEntity>,
    _motion: Attached<SnapshotRecorder<RigidBodyTarget>>,
    /// Timestamp at which the ball despawns, once it has hit something.
    despawn_at: Attached<SnapshotRecorder<Variable<Option<f64>>>>,
}

struct Sandbox {
    timeline: Timeline,
    world: Rc<RefCell<PhysicsWorld>>,
    clicks: Attached<SnapshotRecorder<Variable<u32>>>,
    balls: Vec<Ball>,
    launched: usize,
    rng: Pcg64,
}

impl Sandbox {
    fn new(config: RewindConfig, seed: u64) -> anyhow::Result<Self> {
        let timeline = Timeline::new(config).context("creating timeline")?;
        let world = Rc::new(RefCell::new(PhysicsWorld::new(0.0, -9.81)));

        {
            let mut world = world.borrow_mut();
            let floor = PhysicsBody {
                body_type: PhysicsBodyType::Static,
                collider: ColliderShape::Box {
                    half_width: 20.0,
                    half_height: 0.5,
                },
                restitution: 0.6,
                is_sensor: false,
            };
            world.add_body(&Position { x: 0.0, y: -0.5 }, &Velocity::default(), &floor);
            let wall = PhysicsBody {
                collider: ColliderShape::Box {
                    half_width: 0.5,
                    half_height: 10.0,
                },
                ..floor
            };
            world.add_body(&Position { x: 12.0, y: 5.0 }, &Velocity::default(), &wall);
        }

        let clicks = timeline.attach(Variable::new(0u32));
        Ok(Self {
            timeline,
            world,
            clicks,
            balls: Vec::new(),
            launched: 0,
            rng: Pcg64::seed_from_u64(seed),
        })
    }

    /// Launch a ball from the origin with a jittered velocity.
    fn launch(&mut self) {
        let velocity = Velocity {
            dx: self.rng.gen_range(4.0..9.0),
            dy: self.rng.gen_range(3.0..8.0),
        };
        let body = self.world.borrow_mut().add_body(
            &Position { x: 0.0, y: 1.0 },
            &velocity,
            &PhysicsBody {
                body_type: PhysicsBodyType::Dynamic,
                collider: ColliderShape::Circle { radius: 0.3 },
                restitution: 0.8,
                is_sensor: false,
            },
        );

        let name = format!("ball ({})", self.launched);
        self.launched += 1;
        info!(%name, tick = self.timeline.anchor().index, "launched");

        self.balls.push(Ball {
            name,
            body,
            entity: self.timeline.attach_entity(),
            _motion: self
                .timeline
                .attach(RigidBodyTarget::new(Rc::clone(&self.world), body)),
            despawn_at: self.timeline.attach(Variable::new(None)),
        });

        let mut clicks = self.clicks.borrow_mut();
        let count = *clicks.target().get() + 1;
        clicks.target_mut().set(count);
    }

    /// One frame of game logic, physics, and recording.
    fn frame(&mut self, frame: u32, dt: f64) -> anyhow::Result<()> {
        if self.timeline.is_live() {
            if frame % LAUNCH_INTERVAL == 0 {
                self.launch();
            }

            let collisions = self.world.borrow_mut().step(dt);
            let now = self.timeline.max_time();
            for ball in &self.balls {
                if !ball.entity.borrow().is_spawned() {
                    continue;
                }
                let hit = collisions.iter().any(|c| c.involves(ball.body));
                let mut despawn_at = ball.despawn_at.borrow_mut();
                let deadline = *despawn_at.target().get();
                match deadline {
                    None if hit => despawn_at.target_mut().set(Some(now + DESPAWN_DELAY)),
                    Some(deadline) if now >= deadline => {
                        ball.entity.borrow_mut().despawn(self.timeline.anchor());
                        info!(name = %ball.name, tick = self.timeline.anchor().index, "despawned");
                    }
                    _ => {}
                }
            }
        }

        self.timeline.step(dt)?;
        self.sync_bodies();
        self.reap();
        Ok(())
    }

    /// Bodies of hidden entities leave the simulation.
    fn sync_bodies(&self) {
        let mut world = self.world.borrow_mut();
        for ball in &self.balls {
            world.set_enabled(ball.body, ball.entity.borrow().is_active());
        }
    }

    /// Release balls whose lifetime can no longer be rewound.
    fn reap(&mut self) {
        let world = &self.world;
        self.balls.retain(|ball| {
            if !ball.entity.borrow().is_destroyed() {
                return true;
            }
            world.borrow_mut().remove_body(ball.body);
            info!(name = %ball.name, "destroyed");
            false
        });
    }

    fn clicks(&self) -> u32 {
        *self.clicks.borrow().target().get()
    }

    fn report(&self, label: &str) {
        let active = self
            .balls
            .iter()
            .filter(|b| b.entity.borrow().is_active())
            .count();
        info!(
            label,
            anchor = self.timeline.anchor().index,
            time = %format!("{:.2}", self.timeline.max_time()),
            clicks = self.clicks(),
            balls = self.balls.len(),
            active,
            bodies = self.world.borrow().body_count(),
            "scene"
        );
    }

    /// Pause, scrub across the recorded window, and resume at `fraction` of
    /// it.
    fn rewind(&mut self, fraction: f64) -> anyhow::Result<()> {
        self.timeline.pause()?;
        let (min, max) = (self.timeline.min_time(), self.timeline.max_time());
        self.report("paused");

        for step in 0..=4 {
            let t = max - (max - min) * f64::from(step) / 4.0;
            let tick = self.timeline.seek(t)?;
            self.sync_bodies();
            info!(requested = %format!("{t:.2}"), tick = tick.index, clicks = self.clicks(), "scrub");
        }

        let target = max - (max - min) * fraction;
        let tick = self.timeline.seek(target)?;
        info!(tick = tick.index, "resuming");
        self.timeline.resume()?;
        self.sync_bodies();
        self.reap();
        self.report("resumed");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RewindConfig::from_json_str(r#"{ "max_ticks_per_second": 60, "max_record_duration": 5.0 }"#)?;
    let mut sandbox = Sandbox::new(config, 7)?;
    let mut frame_rng = Pcg64::seed_from_u64(42);

    for frame in 0..FRAMES {
        // Variable frame time around 60 Hz.
        let dt = 1.0 / 60.0 + frame_rng.gen_range(-0.004..0.004);
        sandbox.frame(frame, dt)?;

        if frame == REWIND_FRAME {
            sandbox.rewind(0.6)?;
        }
        if frame % 150 == 0 {
            sandbox.report("live");
        }
    }

    sandbox.report("done");
    info!(history = %sandbox.timeline.history_hash(), "final history hash");
    Ok(())
}
