//! Presentation hints consumed by an external viewer, and the inspection
//! snapshot. Nothing in the algorithm depends on these.

use std::fmt::Write;

use crate::core::state::ParticleState;
use crate::core::tokens::TokenKind;
use crate::engine::particle::Particle;

const GREEN: i32 = 0x00ff00;
const BLACK: i32 = 0x000000;
const RED: i32 = 0xff0000;
const YELLOW: i32 = 0xffff00;
const CYAN: i32 = 0x00ffff;
const MAGENTA: i32 = 0xff00ff;
const NO_MARK: i32 = -1;

impl Particle {
    /// Color of the ring drawn around the head node, or -1 for none.
    pub fn head_mark_color(&self) -> i32 {
        match self.state() {
            ParticleState::Center => GREEN,
            ParticleState::Corner | ParticleState::Idle => {
                if let Some(marker) = self.first_marker() {
                    if self.has_token(TokenKind::LastMarker) {
                        BLACK
                    } else if marker.marker_finished() {
                        RED
                    } else {
                        YELLOW
                    }
                } else if self.possible_center() {
                    GREEN
                } else {
                    NO_MARK
                }
            }
            ParticleState::CenterFound => CYAN,
            ParticleState::Finish | ParticleState::StaticEnd => BLACK,
            ParticleState::Follow => MAGENTA,
            ParticleState::Head => RED,
        }
    }

    /// Port on which the head marker is drawn, or -1 for none.
    pub fn head_mark_dir(&self) -> i32 {
        match self.state() {
            ParticleState::Idle => match self.first_marker() {
                Some(marker) => (marker.passed_from + 3) % 6,
                None => -1,
            },
            ParticleState::StaticEnd | ParticleState::Follow => self.follow_dir(),
            ParticleState::Head => self.move_dir(),
            _ => -1,
        }
    }

    /// Tail ring color; shown only while expanded.
    pub fn tail_mark_color(&self) -> i32 {
        self.head_mark_color()
    }

    /// Multi-line snapshot of the particle's pose, state, and held tokens.
    pub fn inspection_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Global Info:");
        let _ = writeln!(text, "  head: {}", self.head());
        let _ = writeln!(text, "  orientation: {}", self.orientation());
        let _ = writeln!(text, "  global tail dir: {}", self.global_tail_dir());
        let _ = writeln!(text);
        let _ = writeln!(text, "Local Info:");
        let _ = writeln!(text, "  state: {}", self.state());
        if let Some(marker) = self.first_marker() {
            let _ = writeln!(
                text,
                "  marker token: passed from {}, finished: {}",
                marker.passed_from,
                marker.marker_finished()
            );
        }
        if let Some(counter) = self.peek_token(TokenKind::Counter) {
            if let crate::core::tokens::TokenPayload::Counter { counter: value } = counter.payload {
                let _ = writeln!(
                    text,
                    "  counter token: passed from {}, counter: {}",
                    counter.passed_from, value
                );
            }
        }
        if let Some(center) = self.peek_token(TokenKind::Center) {
            let _ = writeln!(text, "  center token: passed from {}", center.passed_from);
        }
        if let Some(finish) = self.peek_token(TokenKind::Finish) {
            let _ = writeln!(text, "  finish token: passed from {}", finish.passed_from);
        }
        text
    }
}
