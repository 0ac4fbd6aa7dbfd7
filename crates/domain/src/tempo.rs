use std::fmt;

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use crate::duration::{is_assignable, lilypond_duration, Duration};
use crate::DomainError;

/// A metronome mark: `units_per_minute` notes of `reference_duration` per minute.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RawTempoMark")]
pub struct TempoMark {
    pub reference_duration: Duration,
    pub units_per_minute: u32,
}

#[derive(Deserialize)]
struct RawTempoMark {
    reference_duration: Duration,
    units_per_minute: u32,
}

impl TryFrom<RawTempoMark> for TempoMark {
    type Error = DomainError;

    fn try_from(raw: RawTempoMark) -> Result<Self, Self::Error> {
        Self::new(raw.reference_duration.reduced(), raw.units_per_minute)
    }
}

impl TempoMark {
    pub fn new(reference_duration: Duration, units_per_minute: u32) -> Result<Self, DomainError> {
        if !is_assignable(reference_duration) {
            return Err(DomainError::validation(format!(
                "tempo reference duration {} is not a note value",
                reference_duration
            )));
        }
        if !(10..=400).contains(&units_per_minute) {
            return Err(DomainError::validation(
                "tempo units per minute must be between 10 and 400",
            ));
        }
        Ok(Self {
            reference_duration,
            units_per_minute,
        })
    }

    /// Quarter note at the given rate.
    pub fn quarter(units_per_minute: u32) -> Result<Self, DomainError> {
        Self::new(Duration::new(1, 4), units_per_minute)
    }

    pub fn duration_to_milliseconds(&self, duration: Duration) -> Ratio<i64> {
        duration / self.reference_duration * Ratio::from_integer(60_000)
            / Ratio::from_integer(i64::from(self.units_per_minute))
    }

    pub fn milliseconds_to_duration(&self, milliseconds: Ratio<i64>) -> Duration {
        milliseconds * self.reference_duration * Ratio::from_integer(i64::from(self.units_per_minute))
            / Ratio::from_integer(60_000)
    }
}

impl fmt::Display for TempoMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = lilypond_duration(self.reference_duration).map_err(|_| fmt::Error)?;
        write!(f, "\\tempo {} = {}", token, self.units_per_minute)
    }
}
