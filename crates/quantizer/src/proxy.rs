use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use crate::q_event::{Millis, QEvent};

/// A q-event seen from inside one beat: `offset` is the event's position as
/// a fraction of the beat, 0 at the downbeat and 1 at the next one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QEventProxy {
    pub q_event: QEvent,
    pub offset: Ratio<i64>,
}

impl QEventProxy {
    pub fn new(q_event: QEvent, offset: Ratio<i64>) -> Self {
        Self { q_event, offset }
    }

    /// `beat_duration_ms` must be positive.
    pub fn in_beat(q_event: QEvent, beat_offset_ms: Millis, beat_duration_ms: Millis) -> Self {
        let offset = (q_event.offset() - beat_offset_ms) / beat_duration_ms;
        Self { q_event, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q_event::millis;
    use tactus_domain::Pitch;

    #[test]
    fn records_given_offset() {
        let q_event = QEvent::pitched(millis(130), [Pitch(0)]);
        let proxy = QEventProxy::new(q_event.clone(), Ratio::new(1, 2));
        assert_eq!(proxy.q_event, q_event);
        assert_eq!(proxy.offset, Ratio::new(1, 2));
    }

    #[test]
    fn computes_offset_within_beat() {
        let q_event = QEvent::pitched(millis(130), [Pitch(0), Pitch(1), Pitch(4)]);
        let proxy = QEventProxy::in_beat(q_event.clone(), millis(100), millis(900));
        assert_eq!(proxy.q_event, q_event);
        assert_eq!(proxy.offset, Ratio::new(1, 30));
    }
}
