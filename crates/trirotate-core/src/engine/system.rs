//! The particle system: arena, occupancy index, movement primitives, and the
//! fair-epoch scheduler.
//!
//! The system owns every particle; the rest of the world refers to particles
//! by [`ParticleId`]. The occupancy index maps each occupied node to the
//! particle owning it and is mutated only by the movement primitives invoked
//! from the currently executing activation, so between activations it is
//! exactly the set of occupied nodes.

use std::collections::{HashMap, VecDeque};

use rand::prelude::*;
use rand::rngs::StdRng;
use slotmap::SlotMap;
use tracing::trace;

use crate::core::ids::ParticleId;
use crate::core::node::Node;
use crate::core::state::ParticleState;
use crate::core::tokens::Token;
use crate::engine::error::EngineError;
use crate::engine::particle::Particle;

pub struct System {
    particles: SlotMap<ParticleId, Particle>,
    /// Insertion order; drives `at` and the epoch refill.
    order: Vec<ParticleId>,
    /// Node -> owning particle, covering heads and tails of expanded
    /// particles.
    occupancy: HashMap<Node, ParticleId>,
    /// Remainder of the current epoch, front is next to activate.
    epoch: VecDeque<ParticleId>,
    rng: StdRng,
}

impl System {
    /// An empty system whose randomness (particle orientations and epoch
    /// permutations) is derived entirely from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            particles: SlotMap::with_key(),
            order: Vec::new(),
            occupancy: HashMap::new(),
            epoch: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The `index`-th particle in insertion order.
    pub fn at(&self, index: usize) -> &Particle {
        &self.particles[self.order[index]]
    }

    pub fn particle(&self, id: ParticleId) -> &Particle {
        &self.particles[id]
    }

    pub(crate) fn particle_mut(&mut self, id: ParticleId) -> &mut Particle {
        &mut self.particles[id]
    }

    /// Particle ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.order.iter().copied()
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.order.iter().map(|&id| &self.particles[id])
    }

    /// The particle occupying `node`, if any.
    pub fn occupant(&self, node: Node) -> Option<ParticleId> {
        self.occupancy.get(&node).copied()
    }

    /// Every occupied node with its owner.
    pub fn occupied_nodes(&self) -> impl Iterator<Item = (Node, ParticleId)> + '_ {
        self.occupancy.iter().map(|(&n, &id)| (n, id))
    }

    /// A uniformly random local compass offset.
    pub(crate) fn rand_orientation(&mut self) -> i32 {
        self.rng.gen_range(0..6)
    }

    /// Insert a particle, claiming its node(s) in the occupancy index.
    pub(crate) fn insert(&mut self, particle: Particle) -> Result<ParticleId, EngineError> {
        if self.occupancy.contains_key(&particle.head()) {
            return Err(EngineError::OccupiedNode {
                node: particle.head(),
            });
        }
        if particle.is_expanded() && self.occupancy.contains_key(&particle.tail()) {
            return Err(EngineError::OccupiedNode {
                node: particle.tail(),
            });
        }
        let head = particle.head();
        let tail = particle.tail();
        let expanded = particle.is_expanded();
        let id = self.particles.insert(particle);
        self.order.push(id);
        self.occupancy.insert(head, id);
        if expanded {
            self.occupancy.insert(tail, id);
        }
        Ok(id)
    }

    // --- neighbor queries ----------------------------------------------------

    /// The particle on the other side of port `label`, if any.
    pub fn neighbor_at_label(&self, id: ParticleId, label: i32) -> Option<ParticleId> {
        let node = self.particles[id].node_at_label(label);
        self.occupant(node)
    }

    pub fn has_nbr_at_label(&self, id: ParticleId, label: i32) -> bool {
        self.neighbor_at_label(id, label).is_some()
    }

    /// Like [`Self::neighbor_at_label`], but an empty port is a fatal error.
    pub fn nbr_at_label(&self, id: ParticleId, label: i32) -> Result<ParticleId, EngineError> {
        self.neighbor_at_label(id, label).ok_or_else(|| {
            let p = &self.particles[id];
            EngineError::EmptyPort {
                head: p.head(),
                state: p.state(),
                label,
            }
        })
    }

    /// Whether the neighbor at `label` is expanded with its tail on that
    /// port's node.
    pub fn has_tail_at_label(&self, id: ParticleId, label: i32) -> bool {
        let node = self.particles[id].node_at_label(label);
        match self.occupant(node) {
            Some(q) => {
                let nbr = &self.particles[q];
                nbr.is_expanded() && nbr.tail() == node
            }
            None => false,
        }
    }

    /// Whether port `nbr_label` of `nbr_id` targets the head node of `id`.
    pub fn points_at_my_head(&self, id: ParticleId, nbr_id: ParticleId, nbr_label: i32) -> bool {
        self.particles[nbr_id].node_at_label(nbr_label) == self.particles[id].head()
    }

    /// Whether port `nbr_label` of `nbr_id` targets the tail node of `id`.
    pub fn points_at_my_tail(&self, id: ParticleId, nbr_id: ParticleId, nbr_label: i32) -> bool {
        self.particles[nbr_id].node_at_label(nbr_label) == self.particles[id].tail()
    }

    /// The neighbor-frame port of the particle at `label` that points back
    /// at this particle's head. Scans the neighbor's ports in label order
    /// and fails if none points back.
    pub fn label_points_at_me(&self, id: ParticleId, label: i32) -> Result<i32, EngineError> {
        let nbr_id = self.nbr_at_label(id, label)?;
        for nbr_label in 0..self.particles[nbr_id].label_count() {
            if self.points_at_my_head(id, nbr_id, nbr_label) {
                return Ok(nbr_label);
            }
        }
        Err(EngineError::NoMutualPort {
            head: self.particles[id].head(),
            nbr_head: self.particles[nbr_id].head(),
        })
    }

    /// First port whose neighbor satisfies `pred`, scanning labels in order.
    pub(crate) fn label_of_first_nbr_where<F>(&self, id: ParticleId, pred: F) -> Option<i32>
    where
        F: Fn(&Particle) -> bool,
    {
        let me = &self.particles[id];
        for label in 0..me.label_count() {
            if let Some(nbr_id) = self.occupant(me.node_at_label(label)) {
                if pred(&self.particles[nbr_id]) {
                    return Some(label);
                }
            }
        }
        None
    }

    /// Whether some neighbor is in one of `states`.
    pub fn has_nbr_in_state(&self, id: ParticleId, states: &[ParticleState]) -> bool {
        self.label_of_first_nbr_where(id, |p| states.contains(&p.state()))
            .is_some()
    }

    // --- movement primitives -------------------------------------------------

    /// Expand into the empty node in local direction `dir`; the head moves
    /// there and the old node becomes the tail.
    pub fn expand(&mut self, id: ParticleId, dir: i32) -> Result<(), EngineError> {
        let me = &self.particles[id];
        if me.is_expanded() {
            return Err(self.illegal_move(id, "expand", "already expanded"));
        }
        let global = me.local_to_global(dir);
        let target = me.head().node_in_dir(global);
        if self.occupancy.contains_key(&target) {
            return Err(self.illegal_move(id, "expand", format!("target {target} is occupied")));
        }
        let me = &mut self.particles[id];
        me.head = target;
        me.global_tail_dir = (global + 3) % 6;
        self.occupancy.insert(target, id);
        Ok(())
    }

    /// Contract out of the head node.
    pub fn contract_head(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let me = &self.particles[id];
        if me.is_contracted() {
            return Err(self.illegal_move(id, "contract", "not expanded"));
        }
        let head = me.head();
        let tail = me.tail();
        self.occupancy.remove(&head);
        let me = &mut self.particles[id];
        me.head = tail;
        me.global_tail_dir = -1;
        Ok(())
    }

    /// Contract out of the tail node.
    pub fn contract_tail(&mut self, id: ParticleId) -> Result<(), EngineError> {
        let me = &self.particles[id];
        if me.is_contracted() {
            return Err(self.illegal_move(id, "contract", "not expanded"));
        }
        let tail = me.tail();
        self.occupancy.remove(&tail);
        self.particles[id].global_tail_dir = -1;
        Ok(())
    }

    /// Whether a handover through port `label` is currently possible.
    pub fn can_push(&self, id: ParticleId, label: i32) -> bool {
        self.particles[id].is_contracted() && self.has_tail_at_label(id, label)
    }

    /// Handover expansion: this contracted particle expands into the tail
    /// node of the expanded neighbor on port `label`, which simultaneously
    /// contracts its tail. One indivisible action for the rest of the
    /// system.
    pub fn push(&mut self, id: ParticleId, label: i32) -> Result<(), EngineError> {
        let me = &self.particles[id];
        if me.is_expanded() {
            return Err(self.illegal_move(id, "push", "already expanded"));
        }
        let global = me.local_to_global(label);
        let target = me.head().node_in_dir(global);
        let Some(nbr_id) = self.occupant(target) else {
            return Err(self.illegal_move(id, "push", format!("no neighbor at {target}")));
        };
        {
            let nbr = &self.particles[nbr_id];
            if !(nbr.is_expanded() && nbr.tail() == target) {
                return Err(self.illegal_move(
                    id,
                    "push",
                    format!("neighbor at {target} has no tail on the shared edge"),
                ));
            }
        }
        self.particles[nbr_id].global_tail_dir = -1;
        let me = &mut self.particles[id];
        me.head = target;
        me.global_tail_dir = (global + 3) % 6;
        self.occupancy.insert(target, id);
        Ok(())
    }

    fn illegal_move(
        &self,
        id: ParticleId,
        movement: &'static str,
        reason: impl Into<String>,
    ) -> EngineError {
        let p = &self.particles[id];
        EngineError::IllegalMove {
            movement,
            head: p.head(),
            state: p.state(),
            reason: reason.into(),
        }
    }

    // --- token delivery ------------------------------------------------------

    pub(crate) fn deliver(&mut self, to: ParticleId, token: Token) {
        self.particles[to].put_token(token);
    }

    // --- scheduler -----------------------------------------------------------

    /// Activate the next particle of the current epoch, refilling the epoch
    /// with a fresh uniform permutation of all particles when it is empty.
    /// Returns the id of the activated particle.
    pub fn activate(&mut self) -> Result<ParticleId, EngineError> {
        if self.epoch.is_empty() {
            if self.order.is_empty() {
                return Err(EngineError::ActivationUnavailable);
            }
            let mut ids = self.order.clone();
            ids.shuffle(&mut self.rng);
            self.epoch = ids.into();
            trace!("scheduler epoch refilled");
        }
        let Some(id) = self.epoch.pop_front() else {
            return Err(EngineError::ActivationUnavailable);
        };
        self.activate_particle(id)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_particle_system() -> (System, ParticleId, ParticleId) {
        let mut system = System::with_seed(7);
        let a = system
            .insert(Particle::new(Node::new(0, 0), -1, 0, ParticleState::Idle))
            .unwrap();
        let b = system
            .insert(Particle::new(Node::new(1, 0), -1, 0, ParticleState::Idle))
            .unwrap();
        (system, a, b)
    }

    #[test]
    fn insert_claims_nodes_and_rejects_collisions() {
        let (mut system, a, _) = two_particle_system();
        assert_eq!(system.len(), 2);
        assert_eq!(system.occupant(Node::new(0, 0)), Some(a));

        let clash = system.insert(Particle::new(Node::new(1, 0), -1, 3, ParticleState::Idle));
        assert!(matches!(clash, Err(EngineError::OccupiedNode { node }) if node == Node::new(1, 0)));
        assert_eq!(system.len(), 2);
    }

    #[test]
    fn neighbor_queries_use_the_occupancy_index() {
        let (system, a, b) = two_particle_system();
        // Orientation 0: port 0 of `a` points at (1, 0).
        assert_eq!(system.neighbor_at_label(a, 0), Some(b));
        assert!(system.has_nbr_at_label(a, 0));
        assert!(!system.has_nbr_at_label(a, 1));
        assert!(system.nbr_at_label(a, 2).is_err());
        // Port 3 of `b` points back at `a`.
        assert_eq!(system.label_points_at_me(a, 0).unwrap(), 3);
        assert!(system.points_at_my_head(a, b, 3));
        assert!(!system.points_at_my_head(a, b, 1));
        // Contracted, so head and tail coincide.
        assert!(system.points_at_my_tail(a, b, 3));
    }

    #[test]
    fn expand_moves_the_head_and_updates_the_index() {
        let (mut system, a, _) = two_particle_system();
        system.expand(a, 1).unwrap();

        let p = system.particle(a);
        assert!(p.is_expanded());
        assert_eq!(p.head(), Node::new(0, 1));
        assert_eq!(p.tail(), Node::new(0, 0));
        assert_eq!(system.occupant(Node::new(0, 1)), Some(a));
        assert_eq!(system.occupant(Node::new(0, 0)), Some(a));

        // Expanding again, or into an occupied node, is illegal.
        assert!(system.expand(a, 0).is_err());
    }

    #[test]
    fn expand_into_occupied_node_is_rejected() {
        let (mut system, a, _) = two_particle_system();
        let err = system.expand(a, 0);
        assert!(matches!(err, Err(EngineError::IllegalMove { .. })));
        assert!(system.particle(a).is_contracted());
    }

    #[test]
    fn contractions_vacate_exactly_one_node() {
        let (mut system, a, _) = two_particle_system();
        system.expand(a, 1).unwrap();
        system.contract_tail(a).unwrap();
        let p = system.particle(a);
        assert!(p.is_contracted());
        assert_eq!(p.head(), Node::new(0, 1));
        assert_eq!(system.occupant(Node::new(0, 0)), None);

        system.expand(a, 2).unwrap();
        system.contract_head(a).unwrap();
        let p = system.particle(a);
        assert!(p.is_contracted());
        assert_eq!(p.head(), Node::new(0, 1));
        assert_eq!(system.occupant(Node::new(-1, 2)), None);

        assert!(system.contract_tail(a).is_err());
    }

    #[test]
    fn push_is_an_atomic_handover() {
        let (mut system, a, b) = two_particle_system();
        // `b` expands away from `a`, leaving its tail on the shared edge.
        system.expand(b, 0).unwrap();
        assert_eq!(system.particle(b).tail(), Node::new(1, 0));
        assert!(system.can_push(a, 0));

        system.push(a, 0).unwrap();

        let pa = system.particle(a);
        let pb = system.particle(b);
        assert!(pa.is_expanded());
        assert_eq!(pa.head(), Node::new(1, 0));
        assert_eq!(pa.tail(), Node::new(0, 0));
        assert!(pb.is_contracted());
        assert_eq!(pb.head(), Node::new(2, 0));
        assert_eq!(system.occupant(Node::new(1, 0)), Some(a));
        assert_eq!(system.occupant(Node::new(2, 0)), Some(b));
    }

    #[test]
    fn push_requires_a_tail_on_the_port() {
        let (mut system, a, _) = two_particle_system();
        // The neighbor is contracted: nothing to hand over.
        assert!(!system.can_push(a, 0));
        assert!(system.push(a, 0).is_err());

        // A neighbor whose *head* sits on the port is no handover partner
        // either.
        let mut other = System::with_seed(7);
        let c = other
            .insert(Particle::new(Node::new(0, 0), -1, 0, ParticleState::Idle))
            .unwrap();
        other
            .insert(Particle::new(Node::new(1, 0), 0, 0, ParticleState::Follow))
            .unwrap();
        assert!(!other.can_push(c, 0));
        assert!(other.push(c, 0).is_err());
    }

    #[test]
    fn epochs_activate_every_particle_exactly_once() {
        let mut system = System::with_seed(11);
        let mut expected: Vec<ParticleId> = Vec::new();
        for x in 0..5 {
            expected.push(
                system
                    .insert(Particle::new(Node::new(x, 0), -1, 0, ParticleState::Finish))
                    .unwrap(),
            );
        }
        for _ in 0..3 {
            let mut seen: Vec<ParticleId> = (0..5).map(|_| system.activate().unwrap()).collect();
            seen.sort();
            let mut all = expected.clone();
            all.sort();
            assert_eq!(seen, all);
        }
    }

    #[test]
    fn activation_order_is_reproducible_from_the_seed() {
        let build = || {
            let mut system = System::with_seed(99);
            for x in 0..6 {
                system
                    .insert(Particle::new(Node::new(x, 0), -1, 0, ParticleState::Finish))
                    .unwrap();
            }
            system
        };
        let mut a = build();
        let mut b = build();
        for _ in 0..18 {
            let ia = a.activate().unwrap();
            let ib = b.activate().unwrap();
            assert_eq!(ia, ib);
        }
    }

    #[test]
    fn activating_an_empty_system_fails() {
        let mut system = System::with_seed(0);
        assert!(matches!(system.activate(), Err(EngineError::ActivationUnavailable)));
    }
}
