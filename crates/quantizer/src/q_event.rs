use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use tactus_domain::Pitch;

/// Offset in milliseconds, kept exact.
pub type Millis = Ratio<i64>;

pub fn millis(value: i64) -> Millis {
    Ratio::from_integer(value)
}

/// A timestamped musical instruction awaiting quantization.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QEvent {
    Pitched {
        offset: Millis,
        pitches: Vec<Pitch>,
        attachments: Vec<String>,
        index: Option<usize>,
    },
    Silent {
        offset: Millis,
        attachments: Vec<String>,
        index: Option<usize>,
    },
    /// Marks the end of a sequence.
    Terminal { offset: Millis },
}

impl QEvent {
    pub fn pitched(offset: Millis, pitches: impl IntoIterator<Item = Pitch>) -> Self {
        let mut pitches: Vec<Pitch> = pitches.into_iter().collect();
        pitches.sort();
        pitches.dedup();
        QEvent::Pitched {
            offset,
            pitches,
            attachments: Vec::new(),
            index: None,
        }
    }

    pub fn silent(offset: Millis) -> Self {
        QEvent::Silent {
            offset,
            attachments: Vec::new(),
            index: None,
        }
    }

    pub fn terminal(offset: Millis) -> Self {
        QEvent::Terminal { offset }
    }

    pub fn with_attachments<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        if let QEvent::Pitched { attachments, .. } | QEvent::Silent { attachments, .. } = &mut self {
            attachments.extend(items.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_index(mut self, value: usize) -> Self {
        if let QEvent::Pitched { index, .. } | QEvent::Silent { index, .. } = &mut self {
            *index = Some(value);
        }
        self
    }

    pub fn offset(&self) -> Millis {
        match self {
            QEvent::Pitched { offset, .. }
            | QEvent::Silent { offset, .. }
            | QEvent::Terminal { offset } => *offset,
        }
    }

    pub fn pitches(&self) -> &[Pitch] {
        match self {
            QEvent::Pitched { pitches, .. } => pitches,
            _ => &[],
        }
    }

    pub fn attachments(&self) -> &[String] {
        match self {
            QEvent::Pitched { attachments, .. } | QEvent::Silent { attachments, .. } => attachments,
            QEvent::Terminal { .. } => &[],
        }
    }

    pub fn is_pitched(&self) -> bool {
        matches!(self, QEvent::Pitched { .. })
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, QEvent::Silent { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QEvent::Terminal { .. })
    }
}
