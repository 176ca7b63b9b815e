use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

/// Exercises the coach knows how to count. `HrOnly` means heart-rate
/// monitoring with no movement analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExerciseType {
    #[default]
    #[serde(rename = "Hr Only")]
    HrOnly,
    #[serde(rename = "bicep-curls")]
    BicepCurls,
    #[serde(rename = "lateral-raises")]
    LateralRaises,
    #[serde(rename = "squats")]
    Squats,
}

impl ExerciseType {
    pub const ALL: [ExerciseType; 4] = [
        ExerciseType::HrOnly,
        ExerciseType::BicepCurls,
        ExerciseType::LateralRaises,
        ExerciseType::Squats,
    ];

    /// Exact string used on the relay wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::HrOnly => "Hr Only",
            ExerciseType::BicepCurls => "bicep-curls",
            ExerciseType::LateralRaises => "lateral-raises",
            ExerciseType::Squats => "squats",
        }
    }

    /// Case-sensitive lookup of a wire string.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|exercise| exercise.as_str() == value)
    }

    pub fn counts_reps(&self) -> bool {
        !matches!(self, ExerciseType::HrOnly)
    }

    /// Human label, e.g. "Lateral Raises".
    pub fn display_name(&self) -> String {
        self.as_str()
            .split(['-', ' '])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exercise selection policy: maps raw input onto an [`ExerciseType`].
///
/// Total function. Missing, blank, or unknown input collapses to
/// [`ExerciseType::HrOnly`] with a warning; matching is exact and
/// case-sensitive.
pub fn normalize(raw: Option<&str>) -> ExerciseType {
    let Some(value) = raw else {
        warn!("Missing exercise type, defaulting to \"Hr Only\"");
        return ExerciseType::HrOnly;
    };

    if value.trim().is_empty() {
        warn!("Empty exercise type, defaulting to \"Hr Only\"");
        return ExerciseType::HrOnly;
    }

    match ExerciseType::from_wire(value) {
        Some(exercise) => exercise,
        None => {
            warn!("Invalid exercise type \"{value}\", defaulting to \"Hr Only\"");
            ExerciseType::HrOnly
        }
    }
}
