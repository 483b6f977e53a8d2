//! # Engine Module
//!
//! The stateful logic core of the simulator: it owns the particle population
//! and orchestrates the activation-by-activation execution of the
//! triangle-rotation algorithm.
//!
//! ## Architecture
//!
//! - **Particles** ([`particle`]) - a particle's pose on the lattice, its
//!   local compass and port labeling, and its token inbox.
//! - **System** ([`system`]) - the particle arena, the node-occupancy index,
//!   the movement primitives (expansion, contraction, handover), and the
//!   fair-epoch scheduler.
//! - **Rules** ([`rules`]) - the per-state activation rules: center
//!   discovery, bending, and motion.
//! - **Appearance** ([`appearance`]) - per-particle presentation hints and
//!   inspection text for an external viewer.
//! - **Errors** ([`error`]) - the engine's failure taxonomy.
//!
//! Scheduling is single-threaded and cooperative: exactly one particle
//! executes at a time, and its activation runs to completion before the next
//! starts. Side effects of an activation are observed by other particles
//! only on their subsequent activations.

pub mod appearance;
pub mod error;
pub mod particle;
pub mod rules;
pub mod system;
