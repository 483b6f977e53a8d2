use thiserror::Error;

use crate::core::node::Node;
use crate::core::state::ParticleState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("side length {side_length} does not describe a perfect triangle (expected 3k + 1 with k >= 1)")]
    InvalidSideLength { side_length: i32 },

    #[error("node {node} is already occupied")]
    OccupiedNode { node: Node },

    #[error("particle at {head} ({state}) has no neighbor on port {label}")]
    EmptyPort {
        head: Node,
        state: ParticleState,
        label: i32,
    },

    #[error("neighbor at {nbr_head} has no port pointing back at {head}")]
    NoMutualPort { head: Node, nbr_head: Node },

    #[error("illegal {movement} by particle at {head} ({state}): {reason}")]
    IllegalMove {
        movement: &'static str,
        head: Node,
        state: ParticleState,
        reason: String,
    },

    #[error("rule '{rule}' invoked in state {state} (particle at {head})")]
    InvalidDispatch {
        rule: &'static str,
        state: ParticleState,
        head: Node,
    },

    #[error("token protocol violated at {head}: {message}")]
    TokenProtocol { head: Node, message: String },

    #[error("activate called on an empty system")]
    ActivationUnavailable,
}
