//! # Workflows Module
//!
//! High-level entry points for users of the library. A workflow validates a
//! run configuration, constructs the initial particle system, and drives the
//! scheduler to termination while reporting progress, returning an organized
//! result.
//!
//! - **Rotation Workflow** ([`rotate`]) - builds a perfect triangle of the
//!   requested side length and runs the triangle-rotation algorithm until
//!   every particle has finished (or an activation cap is reached).

pub mod rotate;
