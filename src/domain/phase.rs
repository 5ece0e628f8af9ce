// ============================================================
// Layer 3 — Phase
// ============================================================
// The train/eval switch is passed explicitly to every call that
// behaves differently per phase (task sampling, user-embedding
// dropout, batch assembly). There is no global mode flag.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Eval,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Eval  => write!(f, "eval"),
        }
    }
}

/// Which phases add the user embedding to the token embeddings.
/// Training and evaluation are toggled independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionPhases {
    pub train: bool,
    pub eval:  bool,
}

impl InjectionPhases {
    pub fn all() -> Self {
        Self { train: true, eval: true }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_phases(phases: &[Phase]) -> Self {
        Self {
            train: phases.contains(&Phase::Train),
            eval:  phases.contains(&Phase::Eval),
        }
    }

    pub fn enabled(&self, phase: Phase) -> bool {
        match phase {
            Phase::Train => self.train,
            Phase::Eval  => self.eval,
        }
    }
}

impl fmt::Display for InjectionPhases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.train, self.eval) {
            (true, true)   => write!(f, "train+eval"),
            (true, false)  => write!(f, "train"),
            (false, true)  => write!(f, "eval"),
            (false, false) => write!(f, "none"),
        }
    }
}
