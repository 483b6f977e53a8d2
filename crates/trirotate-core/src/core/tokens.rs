//! Message tokens exchanged between adjacent particles.
//!
//! Every token records `passed_from`: the port label, in the receiver's
//! frame, through which it arrived (-1 if self-produced). The payload is a
//! tagged variant; `LastMarker` is a kind of its own and is never matched by
//! a `Marker` kind query, but both belong to the *marker family* consulted by
//! the marker-propagation rule and the appearance hooks.

use std::fmt;

/// A token held in a particle's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Receiver-frame port label the token arrived through, or -1.
    pub passed_from: i32,
    pub payload: TokenPayload,
}

/// Per-kind token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPayload {
    /// Ternary counter traveling along a triangle side.
    Counter { counter: u8 },
    /// Discovery marker deposited every third particle along a side.
    Marker { finished: bool },
    /// The marker emitted by the corner that terminates side-measurement.
    LastMarker { finished: bool },
    /// Probes for, and later broadcasts, the discovered center.
    Center { found: bool },
    /// Designates an axis endpoint; `is_static` selects a static axis.
    BendPoint { is_static: bool },
    /// Installs follow relationships along a row.
    Follow { follow: bool },
    /// Propagates termination along a row.
    Finish,
}

/// Discriminant used by the by-kind inbox operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Counter,
    Marker,
    LastMarker,
    Center,
    BendPoint,
    Follow,
    Finish,
}

impl Token {
    pub fn new(payload: TokenPayload, passed_from: i32) -> Self {
        Self {
            passed_from,
            payload,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.payload.kind()
    }

    /// Whether this token is a `Marker` or a `LastMarker`.
    pub fn is_marker_family(&self) -> bool {
        matches!(
            self.payload,
            TokenPayload::Marker { .. } | TokenPayload::LastMarker { .. }
        )
    }

    /// The `finished` flag of a marker-family token; `false` otherwise.
    pub fn marker_finished(&self) -> bool {
        match self.payload {
            TokenPayload::Marker { finished } | TokenPayload::LastMarker { finished } => finished,
            _ => false,
        }
    }

    /// Set the `finished` flag of a marker-family token in place.
    pub(crate) fn set_marker_finished(&mut self, value: bool) {
        if let TokenPayload::Marker { finished } | TokenPayload::LastMarker { finished } =
            &mut self.payload
        {
            *finished = value;
        }
    }
}

impl TokenPayload {
    pub fn kind(&self) -> TokenKind {
        match self {
            TokenPayload::Counter { .. } => TokenKind::Counter,
            TokenPayload::Marker { .. } => TokenKind::Marker,
            TokenPayload::LastMarker { .. } => TokenKind::LastMarker,
            TokenPayload::Center { .. } => TokenKind::Center,
            TokenPayload::BendPoint { .. } => TokenKind::BendPoint,
            TokenPayload::Follow { .. } => TokenKind::Follow,
            TokenPayload::Finish => TokenKind::Finish,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Counter => "counter",
            TokenKind::Marker => "marker",
            TokenKind::LastMarker => "last marker",
            TokenKind::Center => "center",
            TokenKind::BendPoint => "bend point",
            TokenKind::Follow => "follow",
            TokenKind::Finish => "finish",
        };
        f.write_str(name)
    }
}
