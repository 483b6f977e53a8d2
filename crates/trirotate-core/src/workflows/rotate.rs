use std::collections::HashMap;

use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::core::node::Node;
use crate::core::state::ParticleState;
use crate::engine::error::EngineError;
use crate::engine::particle::Particle;
use crate::engine::system::System;

/// Initial configuration of a rotation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriangleConfig {
    /// Side length of the triangle; must be `3k + 1` with `k >= 1`.
    pub side_length: i32,
    /// Start with the center preplaced at `(k, k)` instead of running the
    /// discovery phase.
    pub set_center: bool,
    /// Seed for particle orientations and the epoch permutations.
    pub seed: u64,
}

/// Driver options independent of the initial configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many activations even if not terminated.
    pub max_activations: Option<u64>,
}

/// Milestones of a run, handed to the observer as they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The triangle stands and the scheduler is about to start.
    TriangleBuilt { particles: usize },
    /// Every particle has been activated once more.
    EpochCompleted { epoch: u64, activations: u64 },
    /// The scheduler stopped, either terminated or capped.
    RunStopped { activations: u64, terminated: bool },
}

pub type RunCallback<'a> = Box<dyn Fn(&RunEvent) + Send + Sync + 'a>;

/// Forwards run milestones to an optional callback, so a driver can render
/// progress without polling the system.
#[derive(Default)]
pub struct RunObserver<'a> {
    callback: Option<RunCallback<'a>>,
}

impl<'a> RunObserver<'a> {
    /// An observer that ignores every event.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: RunCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn notify(&self, event: &RunEvent) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

/// Outcome of a rotation run.
pub struct RunReport {
    /// Activations executed.
    pub activations: u64,
    /// Whether every particle reached its final state.
    pub terminated: bool,
    /// Particles per state at the end of the run.
    pub state_counts: HashMap<ParticleState, usize>,
    /// The system in its final configuration.
    pub system: System,
}

/// Construct the initial triangle: one particle at every node `(x, y)` with
/// `0 <= y`, `0 <= x`, `x + y < side_length`, inserted row-major bottom-up,
/// each with a random orientation.
pub fn build(config: &TriangleConfig) -> Result<System, EngineError> {
    let side = config.side_length;
    if side < 4 || side % 3 != 1 {
        return Err(EngineError::InvalidSideLength { side_length: side });
    }
    let third = (side - 1) / 3;

    let mut system = System::with_seed(config.seed);
    for y in 0..side {
        for x in 0..(side - y) {
            let node = Node::new(x, y);
            let orientation = system.rand_orientation();
            let particle = if config.set_center {
                if x == third && y == third {
                    let mut center =
                        Particle::new(node, -1, orientation, ParticleState::Center);
                    // Anchor the bend emission so the static axes land on
                    // even global directions, as discovery would produce.
                    center.received_center_token_from =
                        if orientation % 2 == 0 { 0 } else { 1 };
                    center
                } else {
                    Particle::new(node, -1, orientation, ParticleState::CenterFound)
                }
            } else {
                Particle::new(node, -1, orientation, ParticleState::Idle)
            };
            system.insert(particle)?;
        }
    }
    Ok(system)
}

/// Build the triangle and activate particles until the algorithm terminates
/// or the activation cap is hit.
#[instrument(skip_all, name = "rotate_workflow")]
pub fn run(
    config: &TriangleConfig,
    options: &RunOptions,
    observer: &RunObserver,
) -> Result<RunReport, EngineError> {
    let mut system = build(config)?;
    info!(
        side_length = config.side_length,
        set_center = config.set_center,
        seed = config.seed,
        particles = system.len(),
        "triangle constructed"
    );
    observer.notify(&RunEvent::TriangleBuilt {
        particles: system.len(),
    });

    let epoch_len = system.len() as u64;
    let mut activations: u64 = 0;
    while !system.has_terminated() {
        if options.max_activations.is_some_and(|cap| activations >= cap) {
            warn!(activations, "activation cap reached before termination");
            break;
        }
        system.activate()?;
        activations += 1;
        if activations % epoch_len == 0 {
            observer.notify(&RunEvent::EpochCompleted {
                epoch: activations / epoch_len,
                activations,
            });
        }
    }

    let terminated = system.has_terminated();
    if terminated {
        info!(activations, "rotation complete");
    }
    observer.notify(&RunEvent::RunStopped {
        activations,
        terminated,
    });

    let state_counts = system.particles().map(|p| p.state()).counts();
    Ok(RunReport {
        activations,
        terminated,
        state_counts,
        system,
    })
}
