//! The particle record: lattice pose, local compass, port labeling, token
//! inbox, and the algorithm's per-particle memory.
//!
//! A contracted particle occupies one node and has six ports labeled `0..6`,
//! counter-clockwise in its local compass; local port `l` corresponds to
//! global direction `(l + orientation) % 6`. An expanded particle occupies
//! two adjacent nodes and has ten ports labeled `0..10`; with `t` the local
//! head-to-tail direction, labels `0..5` are head ports at local directions
//! `(t + 1 + i) % 6` and labels `5..10` are tail ports at local directions
//! `(t + 4 + i) % 6` - a counter-clockwise walk around the two-node
//! perimeter starting just past the shared edge, which itself carries no
//! port. The enumeration is fixed for the lifetime of a run.

use std::collections::VecDeque;

use crate::core::node::Node;
use crate::core::state::ParticleState;
use crate::core::tokens::{Token, TokenKind, TokenPayload};

/// Ports of a contracted particle.
pub const CONTRACTED_LABELS: i32 = 6;
/// Ports of an expanded particle.
pub const EXPANDED_LABELS: i32 = 10;

/// A single amoebot.
///
/// Identity is the [`crate::core::ids::ParticleId`] under which the system's
/// arena stores the particle; the record itself never moves. Neighbor lookups
/// and movement go through the system, which owns the occupancy index.
#[derive(Debug, Clone)]
pub struct Particle {
    /// Node occupied by the particle's head.
    pub(crate) head: Node,
    /// Global direction from head to tail, or -1 when contracted.
    pub(crate) global_tail_dir: i32,
    /// Rotation between the local and the global compass.
    pub(crate) orientation: i32,
    pub(crate) state: ParticleState,
    pub(crate) move_dir: i32,
    pub(crate) follow_dir: i32,
    pub(crate) possible_center: bool,
    /// Arrival port of the probe that made this particle the center; the
    /// center anchors its bend-point emission on it.
    pub(crate) received_center_token_from: i32,
    inbox: VecDeque<Token>,
}

impl Particle {
    /// A new particle with the given head node, global head-to-tail
    /// direction (-1 if contracted), local compass offset, and initial
    /// state.
    pub(crate) fn new(
        head: Node,
        global_tail_dir: i32,
        orientation: i32,
        state: ParticleState,
    ) -> Self {
        debug_assert!((-1..6).contains(&global_tail_dir));
        debug_assert!((0..6).contains(&orientation));
        Self {
            head,
            global_tail_dir,
            orientation,
            state,
            move_dir: -1,
            follow_dir: -1,
            possible_center: false,
            received_center_token_from: -1,
            inbox: VecDeque::new(),
        }
    }

    pub fn head(&self) -> Node {
        self.head
    }

    /// The tail node; equals the head while contracted.
    pub fn tail(&self) -> Node {
        if self.is_contracted() {
            self.head
        } else {
            self.head.node_in_dir(self.global_tail_dir)
        }
    }

    pub fn global_tail_dir(&self) -> i32 {
        self.global_tail_dir
    }

    pub fn orientation(&self) -> i32 {
        self.orientation
    }

    pub fn state(&self) -> ParticleState {
        self.state
    }

    pub fn move_dir(&self) -> i32 {
        self.move_dir
    }

    pub fn follow_dir(&self) -> i32 {
        self.follow_dir
    }

    pub fn possible_center(&self) -> bool {
        self.possible_center
    }

    pub fn is_contracted(&self) -> bool {
        self.global_tail_dir == -1
    }

    pub fn is_expanded(&self) -> bool {
        !self.is_contracted()
    }

    /// Whether this particle occupies `node` with its head or tail.
    pub fn occupies(&self, node: Node) -> bool {
        self.head == node || (self.is_expanded() && self.tail() == node)
    }

    // --- compass conversions -------------------------------------------------

    pub(crate) fn local_to_global(&self, dir: i32) -> i32 {
        (dir + self.orientation).rem_euclid(6)
    }

    pub(crate) fn global_to_local(&self, dir: i32) -> i32 {
        (dir - self.orientation).rem_euclid(6)
    }

    /// Local head-to-tail direction. Only meaningful while expanded.
    pub(crate) fn local_tail_dir(&self) -> i32 {
        debug_assert!(self.is_expanded());
        self.global_to_local(self.global_tail_dir)
    }

    // --- port labeling -------------------------------------------------------

    /// Number of ports in the current expansion state.
    pub fn label_count(&self) -> i32 {
        if self.is_contracted() {
            CONTRACTED_LABELS
        } else {
            EXPANDED_LABELS
        }
    }

    /// The local direction a port points in.
    pub(crate) fn label_to_local_dir(&self, label: i32) -> i32 {
        debug_assert!((0..self.label_count()).contains(&label));
        if self.is_contracted() {
            label
        } else {
            let t = self.local_tail_dir();
            if label < 5 {
                (t + 1 + label) % 6
            } else {
                (t + 4 + (label - 5)) % 6
            }
        }
    }

    /// The node a port originates from (head for labels `0..5` of an
    /// expanded particle, tail for `5..10`).
    pub(crate) fn label_origin(&self, label: i32) -> Node {
        if self.is_contracted() || label < 5 {
            self.head
        } else {
            self.tail()
        }
    }

    /// The adjacent node a port points at.
    pub(crate) fn node_at_label(&self, label: i32) -> Node {
        let global = self.local_to_global(self.label_to_local_dir(label));
        self.label_origin(label).node_in_dir(global)
    }

    /// The head port pointing in local direction `dir`, if any. An expanded
    /// particle has no head port toward its own tail.
    pub(crate) fn dir_to_head_label(&self, dir: i32) -> Option<i32> {
        debug_assert!((0..6).contains(&dir));
        if self.is_contracted() {
            return Some(dir);
        }
        let t = self.local_tail_dir();
        if dir == t {
            None
        } else {
            Some((dir - t - 1).rem_euclid(6))
        }
    }

    // --- token inbox ---------------------------------------------------------

    /// Append a token to the inbox.
    pub fn put_token(&mut self, token: Token) {
        self.inbox.push_back(token);
    }

    /// Whether the inbox holds a token of `kind`.
    pub fn has_token(&self, kind: TokenKind) -> bool {
        self.inbox.iter().any(|t| t.kind() == kind)
    }

    /// The first-arrived token of `kind`, if any.
    pub fn peek_token(&self, kind: TokenKind) -> Option<&Token> {
        self.inbox.iter().find(|t| t.kind() == kind)
    }

    /// Remove and return the first-arrived token of `kind`. Relative order
    /// within each kind is preserved.
    pub fn take_token(&mut self, kind: TokenKind) -> Option<Token> {
        let idx = self.inbox.iter().position(|t| t.kind() == kind)?;
        self.inbox.remove(idx)
    }

    /// The first-arrived marker-family token (`Marker` or `LastMarker`).
    pub fn first_marker(&self) -> Option<&Token> {
        self.inbox.iter().find(|t| t.is_marker_family())
    }

    pub(crate) fn first_marker_mut(&mut self) -> Option<&mut Token> {
        self.inbox.iter_mut().find(|t| t.is_marker_family())
    }

    pub(crate) fn take_first_marker(&mut self) -> Option<Token> {
        let idx = self.inbox.iter().position(|t| t.is_marker_family())?;
        self.inbox.remove(idx)
    }

    /// All held tokens in arrival order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.inbox.iter()
    }

    /// Counter payload of the first-arrived counter token.
    pub(crate) fn take_counter(&mut self) -> Option<(i32, u8)> {
        let tok = self.take_token(TokenKind::Counter)?;
        match tok.payload {
            TokenPayload::Counter { counter } => Some((tok.passed_from, counter)),
            _ => unreachable!("take_token returned a foreign kind"),
        }
    }
}
