use crate::error::{Error, Result};
use crate::util::round_half_up;
use serde::{Deserialize, Serialize};

/// Raw typing counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub correct_chars: u32,
    pub total_chars: u32,
    pub errors: u32,
    pub elapsed_secs: f64,
}

/// Derived rates shown on the typing screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingStats {
    pub wpm: u32,
    pub cpm: u32,
    pub net_wpm: u32,
    /// Always within `0..=100`.
    pub accuracy: u32,
}

impl TypingStats {
    /// Figures reported before a full second of typing has passed.
    pub const NOT_STARTED: TypingStats = TypingStats {
        wpm: 0,
        cpm: 0,
        net_wpm: 0,
        accuracy: 100,
    };
}

fn clamp_rate(value: f64) -> u32 {
    round_half_up(value).clamp(0, u32::MAX as i64) as u32
}

impl StatSnapshot {
    /// `correct_chars` is capped at `total_chars`; a negative or non-finite
    /// elapsed time counts as zero.
    pub fn from_counts(correct_chars: u32, total_chars: u32, errors: u32, elapsed_secs: f64) -> Self {
        let elapsed_secs = if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
            elapsed_secs
        } else {
            0.0
        };
        Self {
            correct_chars: correct_chars.min(total_chars),
            total_chars,
            errors,
            elapsed_secs,
        }
    }

    pub fn compute(&self) -> TypingStats {
        if !(self.elapsed_secs >= 1.0) {
            return TypingStats::NOT_STARTED;
        }
        let minutes = self.elapsed_secs / 60.0;
        let total = self.total_chars as f64;

        let wpm = clamp_rate((total / 5.0) / minutes);
        let cpm = clamp_rate(total / minutes);
        let accuracy = accuracy_percent(self.correct_chars.min(self.total_chars), self.total_chars);
        let net_wpm = clamp_rate(wpm as f64 - self.errors as f64 / minutes);

        TypingStats {
            wpm,
            cpm,
            net_wpm,
            accuracy,
        }
    }
}

/// `round(correct / total * 100)`, or 100 when nothing was typed.
pub fn accuracy_percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    let ratio = correct.min(total) as f64 / total as f64;
    round_half_up(ratio * 100.0).clamp(0, 100) as u32
}

/// Aim-trainer accuracy: hits over shots fired, 100 before the first shot.
pub fn shot_accuracy(hits: u32, shots: u32) -> u32 {
    accuracy_percent(hits, shots)
}

/// Rounded mean reaction time. An empty sample is "not available yet",
/// never zero.
pub fn average_reaction_ms(samples_ms: &[u64]) -> Result<u64> {
    if samples_ms.is_empty() {
        return Err(Error::NoSamples);
    }
    let sum: u128 = samples_ms.iter().map(|&ms| ms as u128).sum();
    let avg = sum as f64 / samples_ms.len() as f64;
    Ok(round_half_up(avg).max(0) as u64)
}

/// Spread of reaction times (population standard deviation).
pub fn reaction_consistency_ms(samples_ms: &[u64]) -> Result<f64> {
    let samples: Vec<f64> = samples_ms.iter().map(|&ms| ms as f64).collect();
    crate::util::std_dev(&samples).ok_or(Error::NoSamples)
}
