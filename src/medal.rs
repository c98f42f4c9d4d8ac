use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum Medal {
    Fail,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Ace,
}

/// Minimum words per minute and accuracy for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub medal: Medal,
    pub wpm: u32,
    pub accuracy: u32,
}

/// Highest tier first.
pub const THRESHOLDS: [Threshold; 6] = [
    Threshold { medal: Medal::Ace, wpm: 120, accuracy: 98 },
    Threshold { medal: Medal::Diamond, wpm: 90, accuracy: 95 },
    Threshold { medal: Medal::Platinum, wpm: 70, accuracy: 90 },
    Threshold { medal: Medal::Gold, wpm: 50, accuracy: 85 },
    Threshold { medal: Medal::Silver, wpm: 35, accuracy: 80 },
    Threshold { medal: Medal::Bronze, wpm: 20, accuracy: 70 },
];

/// How a typing result is matched against [`THRESHOLDS`].
///
/// The two rules disagree on mixed results (fast but sloppy, slow but
/// clean) and are kept side by side rather than merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MedalPolicy {
    /// A tier is earned when either wpm or accuracy reaches it.
    #[default]
    AnyThreshold,
    /// A tier needs both wpm and accuracy.
    AllThresholds,
}

impl MedalPolicy {
    pub fn award(&self, wpm: u32, accuracy: u32) -> Medal {
        THRESHOLDS
            .iter()
            .find(|t| match self {
                MedalPolicy::AnyThreshold => wpm >= t.wpm || accuracy >= t.accuracy,
                MedalPolicy::AllThresholds => wpm >= t.wpm && accuracy >= t.accuracy,
            })
            .map_or(Medal::Fail, |t| t.medal)
    }
}

impl Medal {
    pub fn title(&self) -> &'static str {
        match self {
            Medal::Fail => "No Medal - Keep Practicing!",
            Medal::Bronze => "Bronze Medal - Keep Improving!",
            Medal::Silver => "Silver Medal - Good Work!",
            Medal::Gold => "Gold Medal - Well Done!",
            Medal::Platinum => "Platinum Medal - Great Job!",
            Medal::Diamond => "Diamond Medal - Outstanding Performance!",
            Medal::Ace => "ACE Medal - You're a Typing Master!",
        }
    }

    pub fn congrats(&self) -> &'static str {
        match self {
            Medal::Fail => "Better luck next time",
            Medal::Bronze => "Good Start",
            Medal::Silver => "Nice Job",
            Medal::Gold => "Great Achievement",
            Medal::Platinum => "Fantastic Performance",
            Medal::Diamond => "Excellent Work",
            Medal::Ace => "Incredible Achievement",
        }
    }

    pub fn is_fail(&self) -> bool {
        *self == Medal::Fail
    }
}
