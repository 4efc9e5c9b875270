//! Easing curves for fades
//!
//! Pure functions of normalized time `t` in `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Shape of a fade over its duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Easing {
    /// Constant speed
    #[default]
    Linear,
    /// Slow start and end, `(1 - cos(t·π)) / 2`
    SCurve,
    /// Accelerating, `t²`
    EaseIn,
    /// Decelerating, `t·(2 - t)`
    EaseOut,
}

impl Easing {
    /// Map normalized time to normalized progress
    pub fn apply(self, t: f64) -> f64 {
        match self {
            Easing::Linear => t,
            Easing::SCurve => (1.0 - (t * PI).cos()) / 2.0,
            Easing::EaseIn => t * t,
            Easing::EaseOut => t * (2.0 - t),
        }
    }

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::SCurve => "scurve",
            Easing::EaseIn => "easein",
            Easing::EaseOut => "easeout",
        }
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown easing name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown easing '{0}'")]
pub struct UnknownEasing(pub String);

impl FromStr for Easing {
    type Err = UnknownEasing;

    /// Accepts the canonical names plus the common hyphen/underscore spellings
    /// ("s-curve", "ease_in", "ease-out", ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "linear" => Ok(Easing::Linear),
            "scurve" => Ok(Easing::SCurve),
            "easein" => Ok(Easing::EaseIn),
            "easeout" => Ok(Easing::EaseOut),
            _ => Err(UnknownEasing(s.to_string())),
        }
    }
}
