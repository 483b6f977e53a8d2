use std::fmt;

/// The states a particle moves through while locating the triangle's center
/// and rotating two of its sides around it.
///
/// `Idle` and `Corner` belong to the discovery phase, `Center` and
/// `CenterFound` to the bending phase, and the rest to the motion phase.
/// Phase membership is monotone: a particle never returns to an earlier
/// phase, and `Finish` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParticleState {
    Idle,
    Corner,
    Center,
    CenterFound,
    Follow,
    Head,
    StaticEnd,
    Finish,
}

impl fmt::Display for ParticleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticleState::Idle => "Idle",
            ParticleState::Corner => "Corner",
            ParticleState::Center => "Center",
            ParticleState::CenterFound => "CenterFound",
            ParticleState::Follow => "Follow",
            ParticleState::Head => "Head",
            ParticleState::StaticEnd => "StaticEnd",
            ParticleState::Finish => "Finish",
        };
        f.write_str(name)
    }
}
