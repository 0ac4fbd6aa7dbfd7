use tactus_domain::{Duration, GraceContainer, Leaf, LeafKind, Pitch};

use crate::q_event::QEvent;

/// Decides what sounds at one attack point when several q-events snapped to
/// it: the pitches of the main leaf (none means a rest) and an optional
/// grace group before it.
pub trait GraceHandler: Send + Sync {
    fn handle(&self, q_events: &[QEvent]) -> (Vec<Pitch>, Option<GraceContainer>);
}

/// The last event is the main leaf; every earlier one becomes a grace note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConcatenatingGraceHandler {
    pub grace_duration: Duration,
    /// Drop silent events from the grace group instead of writing grace rests.
    pub discard_grace_rest: bool,
}

impl Default for ConcatenatingGraceHandler {
    fn default() -> Self {
        Self {
            grace_duration: Duration::new(1, 16),
            discard_grace_rest: false,
        }
    }
}

impl GraceHandler for ConcatenatingGraceHandler {
    fn handle(&self, q_events: &[QEvent]) -> (Vec<Pitch>, Option<GraceContainer>) {
        let Some((last, earlier)) = q_events.split_last() else {
            return (Vec::new(), None);
        };
        let leaves: Vec<Leaf> = earlier
            .iter()
            .filter(|q_event| q_event.is_pitched() || !self.discard_grace_rest)
            .map(|q_event| {
                Leaf::new(
                    LeafKind::from_pitches(q_event.pitches().to_vec()),
                    self.grace_duration,
                )
            })
            .collect();
        let grace = if leaves.is_empty() {
            None
        } else {
            Some(GraceContainer { leaves })
        };
        (last.pitches().to_vec(), grace)
    }
}

/// Keeps only the last event at each attack point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscardingGraceHandler;

impl GraceHandler for DiscardingGraceHandler {
    fn handle(&self, q_events: &[QEvent]) -> (Vec<Pitch>, Option<GraceContainer>) {
        let pitches = q_events
            .last()
            .map(|q_event| q_event.pitches().to_vec())
            .unwrap_or_default();
        (pitches, None)
    }
}

/// Merges every pitch at the attack point into one chord.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollapsingGraceHandler;

impl GraceHandler for CollapsingGraceHandler {
    fn handle(&self, q_events: &[QEvent]) -> (Vec<Pitch>, Option<GraceContainer>) {
        let mut pitches: Vec<Pitch> = q_events
            .iter()
            .flat_map(|q_event| q_event.pitches().iter().copied())
            .collect();
        pitches.sort();
        pitches.dedup();
        (pitches, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q_event::millis;

    fn events() -> Vec<QEvent> {
        vec![
            QEvent::pitched(millis(0), [Pitch(2)]),
            QEvent::silent(millis(10)),
            QEvent::pitched(millis(20), [Pitch(0), Pitch(4)]),
        ]
    }

    #[test]
    fn single_event_has_no_grace() {
        let handler = ConcatenatingGraceHandler::default();
        let (pitches, grace) = handler.handle(&[QEvent::pitched(millis(0), [Pitch(7)])]);
        assert_eq!(pitches, vec![Pitch(7)]);
        assert!(grace.is_none());
    }

    #[test]
    fn concatenating_writes_earlier_events_as_graces() {
        let (pitches, grace) = ConcatenatingGraceHandler::default().handle(&events());
        assert_eq!(pitches, vec![Pitch(0), Pitch(4)]);
        let grace = grace.unwrap();
        assert_eq!(grace.leaves.len(), 2);
        assert_eq!(grace.leaves[0].kind, LeafKind::Note(Pitch(2)));
        assert_eq!(grace.leaves[1].kind, LeafKind::Rest);
        assert!(grace
            .leaves
            .iter()
            .all(|leaf| leaf.written_duration == Duration::new(1, 16)));
    }

    #[test]
    fn concatenating_can_drop_grace_rests() {
        let handler = ConcatenatingGraceHandler {
            grace_duration: Duration::new(1, 32),
            discard_grace_rest: true,
        };
        let (_, grace) = handler.handle(&events());
        let grace = grace.unwrap();
        assert_eq!(grace.leaves.len(), 1);
        assert_eq!(grace.leaves[0].written_duration, Duration::new(1, 32));

        let (pitches, grace) = handler.handle(&[QEvent::silent(millis(0)), QEvent::silent(millis(5))]);
        assert!(pitches.is_empty());
        assert!(grace.is_none());
    }

    #[test]
    fn discarding_keeps_the_last_event() {
        assert_eq!(
            DiscardingGraceHandler.handle(&events()),
            (vec![Pitch(0), Pitch(4)], None)
        );
        assert_eq!(DiscardingGraceHandler.handle(&[]), (Vec::new(), None));
    }

    #[test]
    fn collapsing_merges_pitches() {
        let (pitches, grace) = CollapsingGraceHandler.handle(&events());
        assert_eq!(pitches, vec![Pitch(0), Pitch(2), Pitch(4)]);
        assert!(grace.is_none());
    }
}
