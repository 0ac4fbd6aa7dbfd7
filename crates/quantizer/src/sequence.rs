use num_rational::Ratio;
use num_traits::{CheckedAdd, Signed, Zero};
use serde::{Deserialize, Serialize};
use tactus_domain::{Duration, Pitch, TempoMark};

use crate::error::QuantizeError;
use crate::q_event::{Millis, QEvent};

/// A well-formed, strictly ordered run of q-events ending in one terminal event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<QEvent>", into = "Vec<QEvent>")]
pub struct QEventSequence {
    events: Vec<QEvent>,
}

impl QEventSequence {
    pub fn new(events: Vec<QEvent>) -> Result<Self, QuantizeError> {
        let (last, body) = match events.split_last() {
            Some((last, body)) if !body.is_empty() => (last, body),
            _ => {
                return Err(QuantizeError::malformed(
                    "a sequence needs at least one event before its terminal event",
                ))
            }
        };
        if !last.is_terminal() {
            return Err(QuantizeError::malformed("sequence must end with a terminal event"));
        }
        if let Some(position) = body.iter().position(QEvent::is_terminal) {
            return Err(QuantizeError::malformed(format!(
                "terminal event at position {} is not last",
                position
            )));
        }
        if events[0].offset().is_negative() {
            return Err(QuantizeError::malformed("first event has a negative offset"));
        }
        for (position, pair) in events.windows(2).enumerate() {
            if pair[1].offset() <= pair[0].offset() {
                return Err(QuantizeError::malformed(format!(
                    "offsets are not strictly increasing at position {} ({} then {})",
                    position + 1,
                    pair[0].offset(),
                    pair[1].offset()
                )));
            }
        }
        Ok(Self { events })
    }

    /// Pitched events (middle C) at each offset; the last offset becomes the terminal event.
    pub fn from_millisecond_offsets(offsets: &[f64]) -> Result<Self, QuantizeError> {
        let (last, body) = offsets
            .split_last()
            .ok_or_else(|| QuantizeError::malformed("no offsets given"))?;
        let mut events = body
            .iter()
            .map(|&offset| -> Result<QEvent, QuantizeError> {
                Ok(QEvent::pitched(exact_millis(offset)?, [Pitch(0)]))
            })
            .collect::<Result<Vec<_>, _>>()?;
        events.push(QEvent::terminal(exact_millis(*last)?));
        Self::new(events)
    }

    /// Middle C for positive durations, silence for negative ones.
    pub fn from_millisecond_durations(
        durations: &[f64],
        fuse_silences: bool,
    ) -> Result<Self, QuantizeError> {
        let mut exact = Vec::with_capacity(durations.len());
        for &duration in durations {
            exact.push(exact_millis(duration)?);
        }
        if fuse_silences {
            exact = fuse_negative_runs(exact);
        }
        let pairs = exact
            .into_iter()
            .map(|duration| {
                let pitches = if duration.is_negative() {
                    None
                } else {
                    Some(vec![Pitch(0)])
                };
                (duration.abs(), pitches)
            })
            .collect::<Vec<_>>();
        Self::from_exact_pairs(pairs)
    }

    /// `(duration_ms, pitches)` pairs; `None` marks silence and adjacent
    /// silences are fused.
    pub fn from_millisecond_pitch_pairs(
        pairs: &[(f64, Option<Vec<Pitch>>)],
    ) -> Result<Self, QuantizeError> {
        let mut fused: Vec<(Millis, Option<Vec<Pitch>>)> = Vec::with_capacity(pairs.len());
        for (duration, pitches) in pairs {
            let duration = exact_millis(*duration)?;
            if !duration.is_positive() {
                return Err(QuantizeError::malformed("pair durations must be positive"));
            }
            if matches!(pitches, Some(p) if p.is_empty()) {
                return Err(QuantizeError::malformed("pitch lists must not be empty"));
            }
            match (fused.last_mut(), pitches) {
                (Some((previous, None)), None) => *previous = checked_sum(previous, &duration)?,
                _ => fused.push((duration, pitches.clone())),
            }
        }
        Self::from_exact_pairs(fused)
    }

    /// Durations in whole notes, negative for silence, converted with `tempo`.
    pub fn from_tempo_scaled_durations(
        durations: &[Duration],
        tempo: &TempoMark,
    ) -> Result<Self, QuantizeError> {
        let fused = fuse_negative_runs(durations.to_vec());
        let pairs = fused
            .into_iter()
            .map(|duration| {
                let pitches = if duration.is_negative() {
                    None
                } else {
                    Some(vec![Pitch(0)])
                };
                (tempo.duration_to_milliseconds(duration.abs()), pitches)
            })
            .collect::<Vec<_>>();
        Self::from_exact_pairs(pairs)
    }

    fn from_exact_pairs(pairs: Vec<(Millis, Option<Vec<Pitch>>)>) -> Result<Self, QuantizeError> {
        if pairs.iter().any(|(duration, _)| duration.is_zero()) {
            return Err(QuantizeError::malformed("durations must be non-zero"));
        }
        let mut offset = Millis::zero();
        let mut events = Vec::with_capacity(pairs.len() + 1);
        for (duration, pitches) in pairs {
            events.push(match pitches {
                Some(pitches) => QEvent::pitched(offset, pitches),
                None => QEvent::silent(offset),
            });
            offset = checked_sum(&offset, &duration)?;
        }
        events.push(QEvent::terminal(offset));
        Self::new(events)
    }

    pub fn events(&self) -> &[QEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the terminal event.
    pub fn duration_in_ms(&self) -> Millis {
        self.events
            .last()
            .map(QEvent::offset)
            .unwrap_or_else(Millis::zero)
    }
}

impl TryFrom<Vec<QEvent>> for QEventSequence {
    type Error = QuantizeError;

    fn try_from(events: Vec<QEvent>) -> Result<Self, Self::Error> {
        Self::new(events)
    }
}

impl From<QEventSequence> for Vec<QEvent> {
    fn from(sequence: QEventSequence) -> Self {
        sequence.events
    }
}

/// Largest accepted millisecond magnitude, a little over 31 years.
pub const MAX_MILLIS: f64 = 1e12;

/// Float milliseconds, rounded to the microsecond.
pub fn exact_millis(value: f64) -> Result<Millis, QuantizeError> {
    if !value.is_finite() {
        return Err(QuantizeError::malformed(format!(
            "millisecond value {} is not finite",
            value
        )));
    }
    if value.abs() > MAX_MILLIS {
        return Err(QuantizeError::malformed(format!(
            "millisecond value {} exceeds {} ms",
            value, MAX_MILLIS
        )));
    }
    Ok(Ratio::new((value * 1000.0).round() as i64, 1000))
}

fn checked_sum(a: &Millis, b: &Millis) -> Result<Millis, QuantizeError> {
    a.checked_add(b)
        .ok_or_else(|| QuantizeError::malformed(format!("offset {} + {} ms overflows", a, b)))
}

fn fuse_negative_runs(values: Vec<Ratio<i64>>) -> Vec<Ratio<i64>> {
    let mut fused: Vec<Ratio<i64>> = Vec::with_capacity(values.len());
    for value in values {
        match fused.last_mut() {
            Some(previous) if previous.is_negative() && value.is_negative() => *previous += value,
            _ => fused.push(value),
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q_event::millis;

    #[test]
    fn rejects_malformed_sequences() {
        assert!(QEventSequence::new(vec![QEvent::terminal(millis(0))]).is_err());
        assert!(QEventSequence::new(vec![QEvent::silent(millis(0)), QEvent::silent(millis(5))])
            .is_err());
        assert!(QEventSequence::new(vec![
            QEvent::silent(millis(10)),
            QEvent::silent(millis(10)),
            QEvent::terminal(millis(20)),
        ])
        .is_err());
        assert!(QEventSequence::new(vec![
            QEvent::silent(millis(0)),
            QEvent::terminal(millis(10)),
            QEvent::terminal(millis(20)),
        ])
        .is_err());
        assert!(QEventSequence::new(vec![
            QEvent::silent(millis(-5)),
            QEvent::terminal(millis(10)),
        ])
        .is_err());
    }

    #[test]
    fn durations_with_fused_silences() {
        let sequence =
            QEventSequence::from_millisecond_durations(&[100.0, -250.0, -250.0, 500.0], true)
                .unwrap();
        assert_eq!(
            sequence.events(),
            &[
                QEvent::pitched(millis(0), [Pitch(0)]),
                QEvent::silent(millis(100)),
                QEvent::pitched(millis(600), [Pitch(0)]),
                QEvent::terminal(millis(1100)),
            ]
        );
        assert_eq!(sequence.duration_in_ms(), millis(1100));
    }

    #[test]
    fn durations_without_fusing() {
        let sequence =
            QEventSequence::from_millisecond_durations(&[-250.0, -250.0], false).unwrap();
        assert_eq!(sequence.len(), 3);
        assert!(QEventSequence::from_millisecond_durations(&[100.0, 0.0], false).is_err());
    }

    #[test]
    fn pitch_pairs_fuse_silences() {
        let sequence = QEventSequence::from_millisecond_pitch_pairs(&[
            (100.0, None),
            (200.0, None),
            (150.5, Some(vec![Pitch(4), Pitch(0)])),
            (50.0, Some(vec![Pitch(2)])),
        ])
        .unwrap();
        assert_eq!(
            sequence.events(),
            &[
                QEvent::silent(millis(0)),
                QEvent::pitched(millis(300), [Pitch(0), Pitch(4)]),
                QEvent::pitched(Ratio::new(901, 2), [Pitch(2)]),
                QEvent::terminal(Ratio::new(1001, 2)),
            ]
        );
    }

    #[test]
    fn offsets_end_in_terminal() {
        let sequence = QEventSequence::from_millisecond_offsets(&[0.0, 250.0, 1000.0]).unwrap();
        assert!(sequence.events()[2].is_terminal());
        assert_eq!(sequence.duration_in_ms(), millis(1000));
    }

    #[test]
    fn tempo_scaled_durations() {
        let tempo = TempoMark::quarter(60).unwrap();
        let sequence = QEventSequence::from_tempo_scaled_durations(
            &[Duration::new(1, 4), Duration::new(-1, 8), Duration::new(-1, 8), Duration::new(1, 2)],
            &tempo,
        )
        .unwrap();
        assert_eq!(
            sequence.events(),
            &[
                QEvent::pitched(millis(0), [Pitch(0)]),
                QEvent::silent(millis(1000)),
                QEvent::pitched(millis(2000), [Pitch(0)]),
                QEvent::terminal(millis(4000)),
            ]
        );
    }

    #[test]
    fn float_millis_are_rounded_exactly() {
        let value = exact_millis(333.3334).unwrap();
        assert_eq!(value, Ratio::new(333_333, 1000));
        approx::assert_relative_eq!(
            *value.numer() as f64 / *value.denom() as f64,
            333.333,
            epsilon = 1e-9
        );
        assert!(exact_millis(f64::NAN).is_err());
    }

    #[test]
    fn oversized_durations_are_malformed() {
        assert!(exact_millis(MAX_MILLIS).is_ok());
        let huge = QEventSequence::from_millisecond_pitch_pairs(&[
            (1e16, Some(vec![Pitch(0)])),
            (1e16, Some(vec![Pitch(2)])),
        ]);
        assert!(matches!(huge, Err(QuantizeError::MalformedSequence(_))));
        assert!(matches!(
            QEventSequence::from_millisecond_offsets(&[0.0, -1e300]),
            Err(QuantizeError::MalformedSequence(_))
        ));
    }

    #[test]
    fn offset_overflow_is_malformed() {
        let tempo = TempoMark::quarter(60).unwrap();
        // each half converts to i64::MAX / 60 ms without overflowing
        let long = Duration::new(i64::MAX, 240_000);
        let result = QEventSequence::from_tempo_scaled_durations(&[long, long], &tempo);
        assert!(matches!(result, Err(QuantizeError::MalformedSequence(_))));
    }
}
