use std::collections::BTreeMap;

use num_rational::Ratio;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use tactus_domain::{Duration, TempoMark};

use crate::error::QuantizeError;
use crate::q_event::Millis;
use crate::search_tree::SearchTree;
use crate::target::{QTarget, QTargetBeat};

/// Settings that change from one beat onwards. Unset fields keep whatever
/// was in force before.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeatwiseQSchemaItem {
    #[serde(default)]
    pub beatspan: Option<Duration>,
    #[serde(default)]
    pub search_tree: Option<SearchTree>,
    #[serde(default)]
    pub tempo: Option<TempoMark>,
}

/// The settings in force for one beat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBeat {
    pub beatspan: Duration,
    pub search_tree: SearchTree,
    pub tempo: TempoMark,
}

/// Lays out equal beats, with per-beat overrides.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawBeatwiseQSchema")]
pub struct BeatwiseQSchema {
    beatspan: Duration,
    search_tree: SearchTree,
    tempo: TempoMark,
    overrides: BTreeMap<usize, BeatwiseQSchemaItem>,
}

#[derive(Deserialize)]
struct RawBeatwiseQSchema {
    beatspan: Duration,
    search_tree: SearchTree,
    tempo: TempoMark,
    #[serde(default)]
    overrides: BTreeMap<usize, BeatwiseQSchemaItem>,
}

impl TryFrom<RawBeatwiseQSchema> for BeatwiseQSchema {
    type Error = QuantizeError;

    fn try_from(raw: RawBeatwiseQSchema) -> Result<Self, Self::Error> {
        let mut schema = Self::new(raw.beatspan.reduced(), raw.search_tree, raw.tempo)?;
        for (beat, mut item) in raw.overrides {
            item.beatspan = item.beatspan.map(|beatspan| beatspan.reduced());
            schema = schema.with_override(beat, item)?;
        }
        Ok(schema)
    }
}

impl Default for BeatwiseQSchema {
    fn default() -> Self {
        Self {
            beatspan: Duration::new(1, 4),
            search_tree: SearchTree::default(),
            tempo: TempoMark {
                reference_duration: Duration::new(1, 4),
                units_per_minute: 60,
            },
            overrides: BTreeMap::new(),
        }
    }
}

impl BeatwiseQSchema {
    pub fn new(
        beatspan: Duration,
        search_tree: SearchTree,
        tempo: TempoMark,
    ) -> Result<Self, QuantizeError> {
        search_tree.validate_beatspan(beatspan)?;
        validate_tempo(&tempo)?;
        Ok(Self {
            beatspan,
            search_tree,
            tempo,
            overrides: BTreeMap::new(),
        })
    }

    pub fn with_override(
        mut self,
        beat: usize,
        item: BeatwiseQSchemaItem,
    ) -> Result<Self, QuantizeError> {
        if let Some(beatspan) = item.beatspan {
            let tree = item.search_tree.as_ref().unwrap_or(&self.search_tree);
            tree.validate_beatspan(beatspan)?;
        }
        if let Some(tempo) = &item.tempo {
            validate_tempo(tempo)?;
        }
        self.overrides.insert(beat, item);
        Ok(self)
    }

    pub fn beatspan(&self) -> Duration {
        self.beatspan
    }

    pub fn search_tree(&self) -> &SearchTree {
        &self.search_tree
    }

    pub fn tempo(&self) -> TempoMark {
        self.tempo
    }

    pub fn overrides(&self) -> &BTreeMap<usize, BeatwiseQSchemaItem> {
        &self.overrides
    }

    /// Each setting comes from the latest override at or before `beat` that
    /// sets it, falling back to the schema defaults.
    pub fn item_at(&self, beat: usize) -> ResolvedBeat {
        let earlier = || self.overrides.range(..=beat).rev().map(|(_, item)| item);
        ResolvedBeat {
            beatspan: earlier()
                .find_map(|item| item.beatspan)
                .unwrap_or(self.beatspan),
            search_tree: earlier()
                .find_map(|item| item.search_tree.clone())
                .unwrap_or_else(|| self.search_tree.clone()),
            tempo: earlier().find_map(|item| item.tempo).unwrap_or(self.tempo),
        }
    }

    /// Beats laid end to end from 0 until `duration_in_ms` is covered.
    pub fn target_for(&self, duration_in_ms: Millis) -> Result<QTarget, QuantizeError> {
        if !duration_in_ms.is_positive() {
            return Err(QuantizeError::malformed(format!(
                "cannot lay beats over a duration of {} ms",
                duration_in_ms
            )));
        }
        let mut beats = Vec::new();
        let mut offset: Millis = Ratio::zero();
        while offset < duration_in_ms {
            let resolved = self.item_at(beats.len());
            resolved.search_tree.validate_beatspan(resolved.beatspan)?;
            let beat_ms = resolved.tempo.duration_to_milliseconds(resolved.beatspan);
            beats.push(QTargetBeat::new(
                resolved.beatspan,
                offset,
                beat_ms,
                resolved.search_tree,
                resolved.tempo,
            ));
            offset += beat_ms;
        }
        QTarget::new(beats)
    }
}

/// Re-runs `TempoMark::new`'s checks on a mark built from its fields.
fn validate_tempo(tempo: &TempoMark) -> Result<(), QuantizeError> {
    TempoMark::new(tempo.reference_duration, tempo.units_per_minute)
        .map(|_| ())
        .map_err(|err| QuantizeError::configuration(err.to_string()))
}
