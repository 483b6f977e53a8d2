//! The per-state activation rules of the triangle-rotation algorithm.
//!
//! `activate_particle` dispatches on the particle's state to one of three
//! rule groups: center discovery (`Idle`, `Corner`), bending (`Center`,
//! `CenterFound`), and motion (`Follow`, `Head`, `StaticEnd`, `Finish`).
//! Each rule reads inbox tokens and the neighborhood, may emit tokens into
//! neighbor inboxes, may change local state, and issues at most one movement
//! primitive. Entering a rule group in a foreign state is a fatal error.

use tracing::{debug, trace};

use crate::core::ids::ParticleId;
use crate::core::state::ParticleState;
use crate::core::tokens::{Token, TokenKind, TokenPayload};
use crate::engine::error::EngineError;
use crate::engine::system::System;

impl System {
    pub(crate) fn activate_particle(&mut self, id: ParticleId) -> Result<(), EngineError> {
        match self.particle(id).state() {
            ParticleState::Idle | ParticleState::Corner => self.find_center(id),
            ParticleState::Center | ParticleState::CenterFound => self.bend(id),
            ParticleState::Follow
            | ParticleState::Head
            | ParticleState::StaticEnd
            | ParticleState::Finish => self.move_rule(id),
        }
    }

    /// True once every particle is in `Finish` (or still the `Center`, which
    /// finishes on its next activation).
    pub fn has_terminated(&self) -> bool {
        self.particles()
            .all(|p| matches!(p.state(), ParticleState::Finish | ParticleState::Center))
    }

    // --- phase A: center discovery -------------------------------------------

    fn find_center(&mut self, id: ParticleId) -> Result<(), EngineError> {
        match self.particle(id).state() {
            ParticleState::Idle => {
                if let Some((first, second)) = self.corner_labels(id) {
                    self.become_corner(id, first, second)
                } else {
                    self.forward_counter(id)?;
                    self.propagate_marker(id)?;
                    self.emit_center_probe(id)?;
                    self.handle_center_token(id)
                }
            }
            ParticleState::Corner => {
                // A counter arriving back at a corner has walked a full side.
                if let Some((passed_from, counter)) = self.particle_mut(id).take_counter() {
                    if counter != 0 {
                        return Err(EngineError::TokenProtocol {
                            head: self.particle(id).head(),
                            message: format!(
                                "corner received counter {counter}, expected 0 on a perfect side"
                            ),
                        });
                    }
                    let reply_from = self.label_points_at_me(id, passed_from)?;
                    let nbr = self.nbr_at_label(id, passed_from)?;
                    self.deliver(
                        nbr,
                        Token::new(TokenPayload::LastMarker { finished: false }, reply_from),
                    );
                }
                if let Some(tok) = self.particle_mut(id).take_token(TokenKind::Center) {
                    if matches!(tok.payload, TokenPayload::Center { found: true }) {
                        self.particle_mut(id).state = ParticleState::CenterFound;
                    }
                    // A probe cannot reach a corner; ignore it if one does.
                }
                Ok(())
            }
            state => Err(EngineError::InvalidDispatch {
                rule: "find_center",
                state,
                head: self.particle(id).head(),
            }),
        }
    }

    /// Exactly two neighbors on adjacent port labels make a corner.
    fn corner_labels(&self, id: ParticleId) -> Option<(i32, i32)> {
        let me = self.particle(id);
        if me.is_expanded() {
            return None;
        }
        let labels: Vec<i32> = (0..6).filter(|&l| self.has_nbr_at_label(id, l)).collect();
        if labels.len() != 2 {
            return None;
        }
        if labels[0] + 1 == labels[1] || labels[0] == labels[1] - 5 {
            Some((labels[0], labels[1]))
        } else {
            None
        }
    }

    fn become_corner(&mut self, id: ParticleId, first: i32, second: i32) -> Result<(), EngineError> {
        self.particle_mut(id).state = ParticleState::Corner;
        // Send the counter through the counter-clockwise one of the two
        // ports; for the wrapped pair {0, 5} that is 5.
        let dir = if first == 0 && second == 5 { second } else { first };
        let passed_from = self.label_points_at_me(id, dir)?;
        let nbr = self.nbr_at_label(id, dir)?;
        self.deliver(
            nbr,
            Token::new(TokenPayload::Counter { counter: 1 }, passed_from),
        );
        // The self-deposited finished marker terminates the marker chain
        // coming back along this side.
        self.particle_mut(id)
            .put_token(Token::new(TokenPayload::Marker { finished: true }, -1));
        debug!(head = %self.particle(id).head(), "corner detected");
        Ok(())
    }

    /// Take a held counter, spawn a backward marker on wrap, increment
    /// modulo 3 and forward straight.
    fn forward_counter(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let Some((passed_from, counter)) = self.particle_mut(id).take_counter() else {
            return Ok(());
        };
        if counter == 0 {
            let reply_from = self.label_points_at_me(id, passed_from)?;
            let nbr = self.nbr_at_label(id, passed_from)?;
            self.deliver(
                nbr,
                Token::new(TokenPayload::Marker { finished: false }, reply_from),
            );
        }
        let tok = Token::new(
            TokenPayload::Counter {
                counter: (counter + 1) % 3,
            },
            passed_from,
        );
        // A counter that cannot be forwarded has fallen off the side.
        self.pass_token_straight(id, tok)?;
        Ok(())
    }

    /// Advance the first-held marker-family token one step, unless the
    /// straight-ahead neighbor already carries a marker pointing back at us
    /// or is a corner; a finished neighbor marker finishes ours in place.
    /// The guard is asymmetric on purpose.
    fn propagate_marker(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let Some(marker) = self.particle(id).first_marker() else {
            return Ok(());
        };
        if marker.marker_finished() {
            return Ok(());
        }
        let new_dir = (marker.passed_from + 3) % 6;
        if !self.has_nbr_at_label(id, new_dir) {
            return Ok(());
        }
        let nbr_label_to_me = self.label_points_at_me(id, new_dir)?;
        let nbr_id = self.nbr_at_label(id, new_dir)?;

        let mut safe_to_pass = true;
        let mut finish_ours = false;
        let nbr = self.particle(nbr_id);
        if let Some(nbr_marker) = nbr.first_marker() {
            if nbr_marker.passed_from == nbr_label_to_me || nbr.state() == ParticleState::Corner {
                safe_to_pass = false;
                if nbr_marker.marker_finished() {
                    finish_ours = true;
                }
            }
        }

        if safe_to_pass {
            if let Some(tok) = self.particle_mut(id).take_first_marker() {
                self.pass_token_straight(id, tok)?;
            }
        } else if finish_ours {
            if let Some(tok) = self.particle_mut(id).first_marker_mut() {
                tok.set_marker_finished(true);
            }
        }
        Ok(())
    }

    /// A finished last marker marks the one-third point of a side: remove it
    /// and launch a center probe one port counter-clockwise of its arrival
    /// port.
    fn emit_center_probe(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let finished = self
            .particle(id)
            .peek_token(TokenKind::LastMarker)
            .is_some_and(|t| t.marker_finished());
        if !finished {
            return Ok(());
        }
        let Some(tok) = self.particle_mut(id).take_token(TokenKind::LastMarker) else {
            return Ok(());
        };
        let dir = (tok.passed_from + 1) % 6;
        let passed_from = self.label_points_at_me(id, dir)?;
        let nbr = self.nbr_at_label(id, dir)?;
        self.deliver(
            nbr,
            Token::new(TokenPayload::Center { found: false }, passed_from),
        );
        trace!(head = %self.particle(id).head(), "center probe launched");
        Ok(())
    }

    fn handle_center_token(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let Some(tok) = self.particle_mut(id).take_token(TokenKind::Center) else {
            return Ok(());
        };
        let TokenPayload::Center { found } = tok.payload else {
            unreachable!("take_token returned a foreign kind");
        };
        if !found {
            if !self.particle(id).possible_center() {
                self.particle_mut(id).possible_center = true;
            } else {
                // Crossed by a second probe: this is the center.
                {
                    let me = self.particle_mut(id);
                    me.state = ParticleState::Center;
                    me.received_center_token_from = tok.passed_from;
                }
                debug!(head = %self.particle(id).head(), "center located");
                for label in 0..6 {
                    if let Some(nbr) = self.neighbor_at_label(id, label) {
                        self.deliver(nbr, Token::new(TokenPayload::Center { found: true }, -1));
                    }
                }
            }
            // The probe keeps traveling; it falls off at the boundary.
            self.pass_token_straight(id, tok)?;
        } else {
            self.particle_mut(id).state = ParticleState::CenterFound;
            for label in 0..6 {
                if let Some(nbr) = self.neighbor_at_label(id, label) {
                    if self.particle(nbr).state() != ParticleState::CenterFound {
                        self.deliver(nbr, Token::new(TokenPayload::Center { found: true }, -1));
                    }
                }
            }
        }
        Ok(())
    }

    // --- phase B: bending ----------------------------------------------------

    fn bend(&mut self, id: ParticleId) -> Result<(), EngineError> {
        match self.particle(id).state() {
            ParticleState::Center => {
                // Three static and three moving axes, alternating around the
                // anchor port.
                let anchor = self.particle(id).received_center_token_from;
                for offset in [0, 2, 4] {
                    let dir = (anchor + offset) % 6;
                    let passed_from = self.label_points_at_me(id, dir)?;
                    let nbr = self.nbr_at_label(id, dir)?;
                    self.deliver(
                        nbr,
                        Token::new(TokenPayload::BendPoint { is_static: true }, passed_from),
                    );

                    let dir = (dir + 1) % 6;
                    let passed_from = self.label_points_at_me(id, dir)?;
                    let nbr = self.nbr_at_label(id, dir)?;
                    self.deliver(
                        nbr,
                        Token::new(TokenPayload::BendPoint { is_static: false }, passed_from),
                    );
                }
                self.particle_mut(id).state = ParticleState::Finish;
                debug!(head = %self.particle(id).head(), "bend points emitted");
                Ok(())
            }
            ParticleState::CenterFound => {
                self.handle_bend_point(id)?;
                self.handle_follow_token(id)
            }
            state => Err(EngineError::InvalidDispatch {
                rule: "bend",
                state,
                head: self.particle(id).head(),
            }),
        }
    }

    fn handle_bend_point(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let Some(tok) = self.particle_mut(id).take_token(TokenKind::BendPoint) else {
            return Ok(());
        };
        let TokenPayload::BendPoint { is_static } = tok.payload else {
            unreachable!("take_token returned a foreign kind");
        };
        if is_static {
            if self.has_nbr_at_label(id, (tok.passed_from + 3) % 6) {
                // Interior of a static axis.
                self.particle_mut(id).state = ParticleState::Finish;
            } else {
                let me = self.particle_mut(id);
                me.state = ParticleState::StaticEnd;
                me.follow_dir = (tok.passed_from + 4) % 6;
            }
        } else {
            let follow_dir = (tok.passed_from + 2) % 6;
            {
                let me = self.particle_mut(id);
                me.state = ParticleState::Follow;
                me.follow_dir = follow_dir;
            }
            if self.has_nbr_at_label(id, follow_dir) {
                let passed_from = self.label_points_at_me(id, follow_dir)?;
                let nbr = self.nbr_at_label(id, follow_dir)?;
                self.deliver(
                    nbr,
                    Token::new(TokenPayload::Follow { follow: false }, passed_from),
                );
            } else {
                // Nobody ahead on this row: lead it.
                let me = self.particle_mut(id);
                me.state = ParticleState::Head;
                me.move_dir = follow_dir;
            }
            let lead_dir = (follow_dir + 2) % 6;
            if self.has_nbr_at_label(id, lead_dir) {
                let passed_from = self.label_points_at_me(id, lead_dir)?;
                let nbr = self.nbr_at_label(id, lead_dir)?;
                self.deliver(
                    nbr,
                    Token::new(TokenPayload::Follow { follow: true }, passed_from),
                );
            }
        }
        // Every bend point is forwarded straight; it drops off at the end of
        // the row.
        self.pass_token_straight(id, tok)?;
        Ok(())
    }

    fn handle_follow_token(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let Some(tok) = self.particle_mut(id).take_token(TokenKind::Follow) else {
            return Ok(());
        };
        let TokenPayload::Follow { follow } = tok.payload else {
            unreachable!("take_token returned a foreign kind");
        };
        if follow {
            // Follow the sender.
            let me = self.particle_mut(id);
            me.state = ParticleState::Follow;
            me.follow_dir = tok.passed_from;
        } else {
            // Follow the next particle in line.
            let follow_dir = (tok.passed_from + 3) % 6;
            {
                let me = self.particle_mut(id);
                me.state = ParticleState::Follow;
                me.follow_dir = follow_dir;
            }
            if !self.has_nbr_at_label(id, follow_dir) {
                let me = self.particle_mut(id);
                me.move_dir = follow_dir;
                me.state = ParticleState::Head;
            }
        }
        self.pass_token_straight(id, tok)?;
        Ok(())
    }

    // --- phase C: motion -----------------------------------------------------

    fn move_rule(&mut self, id: ParticleId) -> Result<(), EngineError> {
        match self.particle(id).state() {
            ParticleState::Follow => {
                // Motion is blocked until bending has propagated past this
                // neighborhood.
                if self.has_nbr_in_state(id, &[ParticleState::CenterFound]) {
                    return Ok(());
                }
                let follow_dir = self.particle(id).follow_dir();
                if self.particle(id).is_contracted() && self.has_tail_at_label(id, follow_dir) {
                    let nbr_id = self.nbr_at_label(id, follow_dir)?;
                    // Where the neighbor is heading, in our compass; after
                    // the handover we hold its old tail node and keep
                    // following its head.
                    let forward_global = (self.particle(nbr_id).global_tail_dir() + 3) % 6;
                    let new_follow_dir = self.particle(id).global_to_local(forward_global);
                    self.push(id, follow_dir)?;
                    self.particle_mut(id).follow_dir = new_follow_dir;
                } else if self.particle(id).is_expanded()
                    && !self.has_tail_follower(id)
                    && !self.has_nbr_in_state(id, &[ParticleState::CenterFound])
                {
                    // Last particle of the row: nothing left to hand over to.
                    self.contract_tail(id)?;
                } else if self.particle(id).is_contracted()
                    && self.has_nbr_at_label(id, follow_dir)
                    && self.particle(self.nbr_at_label(id, follow_dir)?).state()
                        == ParticleState::Finish
                {
                    self.particle_mut(id).state = ParticleState::Finish;
                }
                Ok(())
            }
            ParticleState::Head => {
                // Expand while somebody is still being pulled along behind;
                // checked before the finish token so a head that just moved
                // cannot finish in the same activation.
                let move_dir = self.particle(id).move_dir();
                if self.particle(id).is_contracted()
                    && self.has_nbr_at_label(id, (move_dir + 5) % 6)
                {
                    self.expand(id, move_dir)?;
                }
                if self.particle(id).is_contracted()
                    && self.particle(id).has_token(TokenKind::Finish)
                {
                    self.particle_mut(id).state = ParticleState::Finish;
                }
                Ok(())
            }
            ParticleState::StaticEnd => {
                let follow_dir = self.particle(id).follow_dir();
                if self.has_nbr_at_label(id, follow_dir) {
                    let nbr_id = self.nbr_at_label(id, follow_dir)?;
                    if self.particle(nbr_id).is_contracted() {
                        let passed_from = self.label_points_at_me(id, follow_dir)?;
                        self.deliver(nbr_id, Token::new(TokenPayload::Finish, passed_from));
                        self.particle_mut(id).state = ParticleState::Finish;
                    }
                }
                Ok(())
            }
            ParticleState::Finish => {
                // Relay finish tokens along the row of settled particles.
                let Some(tok) = self.particle(id).peek_token(TokenKind::Finish) else {
                    return Ok(());
                };
                let pass_dir = (tok.passed_from + 3) % 6;
                if let Some(nbr_id) = self.neighbor_at_label(id, pass_dir) {
                    if self.particle(nbr_id).is_contracted() {
                        if let Some(tok) = self.particle_mut(id).take_token(TokenKind::Finish) {
                            self.pass_token_straight(id, tok)?;
                        }
                    }
                }
                Ok(())
            }
            state => Err(EngineError::InvalidDispatch {
                rule: "move",
                state,
                head: self.particle(id).head(),
            }),
        }
    }

    /// Whether some neighbor is a `Follow` whose follow port targets this
    /// particle's tail.
    fn has_tail_follower(&self, id: ParticleId) -> bool {
        let me = self.particle(id);
        for label in 0..me.label_count() {
            let Some(nbr_id) = self.occupant(me.node_at_label(label)) else {
                continue;
            };
            let nbr = self.particle(nbr_id);
            if nbr.state() != ParticleState::Follow || nbr.follow_dir() < 0 {
                continue;
            }
            if let Some(nbr_label) = nbr.dir_to_head_label(nbr.follow_dir()) {
                if self.points_at_my_tail(id, nbr_id, nbr_label) {
                    return true;
                }
            }
        }
        false
    }

    // --- token plumbing ------------------------------------------------------

    /// Forward a token one step in the direction it was already traveling.
    /// Returns the token when there is no straight-ahead neighbor; the
    /// caller decides whether it is dropped or retried later.
    pub(crate) fn pass_token_straight(
        &mut self,
        id: ParticleId,
        mut tok: Token,
    ) -> Result<Option<Token>, EngineError> {
        let new_dir = (tok.passed_from + 3) % 6;
        if !self.has_nbr_at_label(id, new_dir) {
            return Ok(Some(tok));
        }
        tok.passed_from = self.label_points_at_me(id, new_dir)?;
        let nbr = self.nbr_at_label(id, new_dir)?;
        self.deliver(nbr, tok);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use crate::core::node::Node;
    use crate::engine::particle::Particle;
    use crate::workflows::rotate::{build, TriangleConfig};

    fn triangle(side_length: i32, set_center: bool, seed: u64) -> System {
        build(&TriangleConfig {
            side_length,
            set_center,
            seed,
        })
        .unwrap()
    }

    /// Occupancy must be a bijection onto the particles' node sets, and the
    /// expansion flag must agree with the number of occupied nodes.
    fn assert_occupancy_coherent(system: &System) {
        let mut expected: HashMap<Node, ParticleId> = HashMap::new();
        for id in system.ids() {
            let p = system.particle(id);
            if p.is_expanded() {
                assert!(p.head().is_adjacent(&p.tail()));
                assert!(expected.insert(p.tail(), id).is_none(), "overlapping tails");
            }
            assert!(expected.insert(p.head(), id).is_none(), "overlapping heads");
        }
        let actual: HashMap<Node, ParticleId> = system.occupied_nodes().collect();
        assert_eq!(actual, expected);
    }

    fn phase(state: ParticleState) -> u8 {
        match state {
            ParticleState::Idle | ParticleState::Corner => 0,
            ParticleState::Center | ParticleState::CenterFound => 1,
            ParticleState::Follow | ParticleState::Head | ParticleState::StaticEnd => 2,
            ParticleState::Finish => 3,
        }
    }

    struct RunStats {
        activations: u64,
        terminated: bool,
        ever_corner: HashSet<Node>,
        ever_center: HashSet<Node>,
    }

    /// Drive the system to termination (or the cap), checking the
    /// between-activation invariants after every step.
    fn run_checked(mut system: System, cap: u64) -> (System, RunStats) {
        let mut prev: HashMap<ParticleId, ParticleState> = system
            .ids()
            .map(|id| (id, system.particle(id).state()))
            .collect();
        let mut ever_corner = HashSet::new();
        let mut ever_center = HashSet::new();
        let mut activations = 0;
        while !system.has_terminated() && activations < cap {
            system.activate().unwrap();
            activations += 1;

            assert_occupancy_coherent(&system);
            for id in system.ids() {
                let state = system.particle(id).state();
                let before = prev[&id];
                assert!(
                    phase(state) >= phase(before),
                    "particle regressed from {before} to {state}"
                );
                if before == ParticleState::Finish {
                    assert_eq!(state, ParticleState::Finish, "particle left Finish");
                }
                if state == ParticleState::Corner {
                    ever_corner.insert(system.particle(id).head());
                }
                if state == ParticleState::Center {
                    ever_center.insert(system.particle(id).head());
                }
            }
            prev = system
                .ids()
                .map(|id| (id, system.particle(id).state()))
                .collect();

            let counters = system
                .particles()
                .flat_map(|p| p.tokens())
                .filter(|t| t.kind() == TokenKind::Counter)
                .count();
            assert!(counters <= 3, "more counters in flight than sides");
            let probes = system
                .particles()
                .flat_map(|p| p.tokens())
                .filter(|t| matches!(t.payload, TokenPayload::Center { found: false }))
                .count();
            assert!(probes <= 3, "more center probes than last markers");
        }
        let terminated = system.has_terminated();
        (
            system,
            RunStats {
                activations,
                terminated,
                ever_corner,
                ever_center,
            },
        )
    }

    #[test]
    fn small_triangle_discovers_its_center_and_terminates() {
        let (system, stats) = run_checked(triangle(4, false, 42), 20_000);
        assert!(stats.terminated, "did not terminate in {} steps", stats.activations);

        let corners: HashSet<Node> = [Node::new(0, 0), Node::new(3, 0), Node::new(0, 3)]
            .into_iter()
            .collect();
        assert_eq!(stats.ever_corner, corners);
        let centers: HashSet<Node> = [Node::new(1, 1)].into_iter().collect();
        assert_eq!(stats.ever_center, centers);

        assert!(system.particles().all(|p| p.is_contracted()));
        assert_eq!(system.occupied_nodes().count(), system.len());
        assert!(system
            .particles()
            .all(|p| p.state() == ParticleState::Finish));
    }

    #[test]
    fn larger_triangle_discovers_its_center_and_terminates() {
        let (system, stats) = run_checked(triangle(7, false, 3), 80_000);
        assert!(stats.terminated, "did not terminate in {} steps", stats.activations);

        let corners: HashSet<Node> = [Node::new(0, 0), Node::new(6, 0), Node::new(0, 6)]
            .into_iter()
            .collect();
        assert_eq!(stats.ever_corner, corners);
        let centers: HashSet<Node> = [Node::new(2, 2)].into_iter().collect();
        assert_eq!(stats.ever_center, centers);
        assert_eq!(system.occupied_nodes().count(), 28);
    }

    #[test]
    fn preplaced_center_terminates_quickly_for_every_seed() {
        for seed in 0..6 {
            let (_, stats) = run_checked(triangle(4, true, seed), 200);
            assert!(
                stats.terminated,
                "seed {seed} still running after {} activations",
                stats.activations
            );
            assert!(stats.ever_corner.is_empty());
        }
    }

    #[test]
    fn scheduling_after_termination_leaves_the_configuration_unchanged() {
        let (mut system, stats) = run_checked(triangle(4, true, 8), 200);
        assert!(stats.terminated);

        let snapshot: Vec<_> = system
            .ids()
            .map(|id| {
                let p = system.particle(id);
                (p.head(), p.global_tail_dir(), p.state())
            })
            .collect();
        for _ in 0..60 {
            system.activate().unwrap();
        }
        let after: Vec<_> = system
            .ids()
            .map(|id| {
                let p = system.particle(id);
                (p.head(), p.global_tail_dir(), p.state())
            })
            .collect();
        assert_eq!(snapshot, after);
        assert!(system.has_terminated());
    }

    #[test]
    fn fixed_seed_runs_are_byte_identical() {
        let mut a = triangle(4, false, 1234);
        let mut b = triangle(4, false, 1234);
        for _ in 0..20_000 {
            if a.has_terminated() {
                break;
            }
            let ia = a.activate().unwrap();
            let ib = b.activate().unwrap();
            assert_eq!(ia, ib);
            for id in a.ids().collect::<Vec<_>>() {
                let (pa, pb) = (a.particle(id), b.particle(id));
                assert_eq!(pa.head(), pb.head());
                assert_eq!(pa.global_tail_dir(), pb.global_tail_dir());
                assert_eq!(pa.state(), pb.state());
                let ta: Vec<_> = pa.tokens().collect();
                let tb: Vec<_> = pb.tokens().collect();
                assert_eq!(ta, tb);
            }
        }
        assert!(a.has_terminated() && b.has_terminated());
    }

    #[test]
    fn injected_counter_is_incremented_and_forwarded() {
        let mut system = triangle(4, false, 0);
        let source = system.occupant(Node::new(0, 0)).unwrap();
        let receiver = system.occupant(Node::new(1, 0)).unwrap();

        // A counter that just wrapped to 0, as if sent from (0, 0).
        let toward_source = system.particle(receiver).global_to_local(3);
        system.particle_mut(receiver).put_token(Token::new(
            TokenPayload::Counter { counter: 0 },
            toward_source,
        ));
        system.activate_particle(receiver).unwrap();

        // The wrap spawned a backward marker toward the source...
        let marker = system.particle(source).first_marker().unwrap();
        assert!(matches!(
            marker.payload,
            TokenPayload::Marker { finished: false }
        ));
        // ...and the incremented counter moved straight ahead to (2, 0).
        assert!(!system.particle(receiver).has_token(TokenKind::Counter));
        let next = system.occupant(Node::new(2, 0)).unwrap();
        let counter = system.particle(next).peek_token(TokenKind::Counter).unwrap();
        assert!(matches!(
            counter.payload,
            TokenPayload::Counter { counter: 1 }
        ));
        assert_eq!(
            system.particle(next).node_at_label(counter.passed_from),
            Node::new(1, 0)
        );
    }

    #[test]
    fn first_activation_turns_the_corner() {
        let mut system = triangle(4, false, 17);
        let corner = system.occupant(Node::new(0, 0)).unwrap();
        system.activate_particle(corner).unwrap();

        let p = system.particle(corner);
        assert_eq!(p.state(), ParticleState::Corner);
        // The self-deposited marker is already finished.
        assert!(p.first_marker().unwrap().marker_finished());

        // The counter went counter-clockwise along the boundary, to (1, 0).
        let along = system.occupant(Node::new(1, 0)).unwrap();
        let counter = system.particle(along).peek_token(TokenKind::Counter).unwrap();
        assert!(matches!(
            counter.payload,
            TokenPayload::Counter { counter: 1 }
        ));
        let up = system.occupant(Node::new(0, 1)).unwrap();
        assert!(!system.particle(up).has_token(TokenKind::Counter));

        // An interior particle never becomes a corner.
        let interior = system.occupant(Node::new(1, 1)).unwrap();
        system.activate_particle(interior).unwrap();
        assert_eq!(system.particle(interior).state(), ParticleState::Idle);
    }

    #[test]
    fn marker_blocked_by_a_corner_finishes_against_a_finished_one() {
        let mut system = triangle(4, false, 17);
        let corner_id = system.occupant(Node::new(0, 0)).unwrap();
        system.activate_particle(corner_id).unwrap();
        assert_eq!(system.particle(corner_id).state(), ParticleState::Corner);

        // Park an unfinished marker at (1, 0), traveling toward the corner.
        let blocked = system.occupant(Node::new(1, 0)).unwrap();
        let toward_next = system.particle(blocked).global_to_local(0);
        system.particle_mut(blocked).put_token(Token::new(
            TokenPayload::Marker { finished: false },
            toward_next,
        ));
        system.particle_mut(blocked).take_token(TokenKind::Counter);
        system.activate_particle(blocked).unwrap();

        // Not forwarded; finished in place against the corner's marker.
        let marker = system.particle(blocked).first_marker().unwrap();
        assert!(marker.marker_finished());
        let corner_markers = system
            .particle(corner_id)
            .tokens()
            .filter(|t| t.is_marker_family())
            .count();
        assert_eq!(corner_markers, 1);
    }

    #[test]
    fn marker_does_not_enter_a_node_that_already_sent_one_back() {
        let mut system = triangle(4, false, 17);
        let a = system.occupant(Node::new(0, 0)).unwrap();
        let b = system.occupant(Node::new(1, 0)).unwrap();

        // `a` holds a marker it received from `b`; `b` holds one headed
        // toward `a`.
        let a_from_b = system.particle(a).global_to_local(0);
        system
            .particle_mut(a)
            .put_token(Token::new(TokenPayload::Marker { finished: false }, a_from_b));
        let b_from_next = system.particle(b).global_to_local(0);
        system
            .particle_mut(b)
            .put_token(Token::new(TokenPayload::Marker { finished: false }, b_from_next));

        system.activate_particle(b).unwrap();

        // Blocked, and not finished either since `a`'s marker is unfinished.
        let marker = system.particle(b).first_marker().unwrap();
        assert!(!marker.marker_finished());
        let a_markers = system
            .particle(a)
            .tokens()
            .filter(|t| t.is_marker_family())
            .count();
        assert_eq!(a_markers, 1);
    }

    #[test]
    fn rules_reject_foreign_states() {
        let mut system = System::with_seed(0);
        let id = system
            .insert(Particle::new(Node::new(0, 0), -1, 0, ParticleState::Follow))
            .unwrap();
        assert!(matches!(
            system.find_center(id),
            Err(EngineError::InvalidDispatch { rule: "find_center", .. })
        ));
        assert!(matches!(
            system.bend(id),
            Err(EngineError::InvalidDispatch { rule: "bend", .. })
        ));

        system.particle_mut(id).state = ParticleState::Idle;
        assert!(matches!(
            system.move_rule(id),
            Err(EngineError::InvalidDispatch { rule: "move", .. })
        ));
    }

    #[test]
    fn pass_token_straight_returns_the_token_at_the_boundary() {
        let mut system = System::with_seed(0);
        let lone = system
            .insert(Particle::new(Node::new(0, 0), -1, 0, ParticleState::Idle))
            .unwrap();
        let tok = Token::new(TokenPayload::Finish, 2);
        let back = system.pass_token_straight(lone, tok.clone()).unwrap();
        assert_eq!(back, Some(tok));
    }
}
