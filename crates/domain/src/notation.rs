//! The notated voice produced by quantization.
//!
//! A voice is a flat run of components; tuplets nest. Every leaf carries its
//! written duration, and tuplet multipliers scale the written durations of
//! everything they contain.

use num_rational::Ratio;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::duration::Duration;
use crate::pitch::Pitch;
use crate::tempo::TempoMark;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LeafKind {
    Note(Pitch),
    Chord(Vec<Pitch>),
    Rest,
}

impl LeafKind {
    /// No pitches is a rest, one is a note, more is a chord.
    pub fn from_pitches(mut pitches: Vec<Pitch>) -> Self {
        pitches.sort();
        pitches.dedup();
        match pitches.len() {
            0 => LeafKind::Rest,
            1 => LeafKind::Note(pitches[0]),
            _ => LeafKind::Chord(pitches),
        }
    }

    pub fn is_pitched(&self) -> bool {
        !matches!(self, LeafKind::Rest)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraceContainer {
    pub leaves: Vec<Leaf>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Leaf {
    pub kind: LeafKind,
    pub written_duration: Duration,
    /// The following leaf continues this one.
    pub tied: bool,
    pub grace: Option<GraceContainer>,
    pub tempo: Option<TempoMark>,
    /// Raw LilyPond postfix markup, e.g. `\fermata` or `-.`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Leaf {
    pub fn new(kind: LeafKind, written_duration: Duration) -> Self {
        Self {
            kind,
            written_duration,
            tied: false,
            grace: None,
            tempo: None,
            attachments: Vec::new(),
        }
    }

    pub fn rest(written_duration: Duration) -> Self {
        Self::new(LeafKind::Rest, written_duration)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tuplet {
    pub multiplier: Ratio<i64>,
    pub components: Vec<Component>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Component {
    Leaf(Leaf),
    Tuplet(Tuplet),
}

impl Component {
    /// Sounding duration, after tuplet multipliers.
    pub fn duration(&self) -> Duration {
        match self {
            Component::Leaf(leaf) => leaf.written_duration,
            Component::Tuplet(tuplet) => {
                tuplet.multiplier
                    * tuplet
                        .components
                        .iter()
                        .map(Component::duration)
                        .fold(Duration::zero(), |acc, d| acc + d)
            }
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voice {
    pub components: Vec<Component>,
}

impl Voice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, components: impl IntoIterator<Item = Component>) {
        self.components.extend(components);
    }

    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut leaves = Vec::new();
        collect_leaves(&self.components, &mut leaves);
        leaves
    }

    pub fn leaves_mut(&mut self) -> Vec<&mut Leaf> {
        let mut leaves = Vec::new();
        collect_leaves_mut(&mut self.components, &mut leaves);
        leaves
    }

    /// Sounding duration of each leaf, in leaf order.
    pub fn prolated_leaf_durations(&self) -> Vec<Duration> {
        let mut durations = Vec::new();
        collect_prolated(&self.components, Ratio::one(), &mut durations);
        durations
    }

    pub fn duration(&self) -> Duration {
        self.components
            .iter()
            .map(Component::duration)
            .fold(Duration::zero(), |acc, d| acc + d)
    }
}

fn collect_leaves<'a>(components: &'a [Component], out: &mut Vec<&'a Leaf>) {
    for component in components {
        match component {
            Component::Leaf(leaf) => out.push(leaf),
            Component::Tuplet(tuplet) => collect_leaves(&tuplet.components, out),
        }
    }
}

fn collect_leaves_mut<'a>(components: &'a mut [Component], out: &mut Vec<&'a mut Leaf>) {
    for component in components.iter_mut() {
        match component {
            Component::Leaf(leaf) => out.push(leaf),
            Component::Tuplet(tuplet) => collect_leaves_mut(&mut tuplet.components, out),
        }
    }
}

fn collect_prolated(components: &[Component], multiplier: Ratio<i64>, out: &mut Vec<Duration>) {
    for component in components {
        match component {
            Component::Leaf(leaf) => out.push(leaf.written_duration * multiplier),
            Component::Tuplet(tuplet) => {
                collect_prolated(&tuplet.components, multiplier * tuplet.multiplier, out)
            }
        }
    }
}
