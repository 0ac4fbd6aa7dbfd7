//! File-backed settings for a quantization run.
//!
//! Durations are written as fractions of a whole note, e.g. `"3/8"`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration as WallDuration;

use serde::{Deserialize, Serialize};
use tactus_domain::{is_assignable, Duration, TempoMark};

use crate::attack_point_optimizer::{
    AttackPointOptimizer, NaiveAttackPointOptimizer, NullAttackPointOptimizer,
};
use crate::error::QuantizeError;
use crate::grace_handler::{
    CollapsingGraceHandler, ConcatenatingGraceHandler, DiscardingGraceHandler, GraceHandler,
};
use crate::heuristic::DistanceHeuristic;
use crate::job_handler::{JobHandler, ParallelJobHandler, SerialJobHandler};
use crate::pipeline::QuantizeOptions;
use crate::schema::{BeatwiseQSchema, BeatwiseQSchemaItem};
use crate::search_tree::{SearchTree, SearchTreeDefinition};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TempoConfig {
    #[serde(with = "ratio_string")]
    pub reference_duration: Duration,
    pub units_per_minute: u32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            reference_duration: Duration::new(1, 4),
            units_per_minute: 60,
        }
    }
}

impl TempoConfig {
    fn tempo_mark(&self) -> Result<TempoMark, QuantizeError> {
        TempoMark::new(self.reference_duration, self.units_per_minute)
            .map_err(|err| QuantizeError::configuration(err.to_string()))
    }
}

/// Settings that take effect from one beat onwards; unset fields carry over.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OverrideConfig {
    #[serde(with = "optional_ratio_string", skip_serializing_if = "Option::is_none")]
    pub beatspan: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo: Option<TempoConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_tree: Option<SearchTreeDefinition>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobHandlerConfig {
    #[default]
    Serial,
    Parallel {
        workers: usize,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraceHandlerConfig {
    Concatenating {
        #[serde(default = "default_grace_duration", with = "ratio_string")]
        grace_duration: Duration,
        #[serde(default)]
        discard_grace_rest: bool,
    },
    Discarding,
    Collapsing,
}

impl Default for GraceHandlerConfig {
    fn default() -> Self {
        Self::Concatenating {
            grace_duration: default_grace_duration(),
            discard_grace_rest: false,
        }
    }
}

fn default_grace_duration() -> Duration {
    Duration::new(1, 16)
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    #[default]
    Naive,
    Null,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuantizerConfig {
    pub tempo: TempoConfig,
    #[serde(with = "ratio_string")]
    pub beatspan: Duration,
    /// `None` selects the built-in search tree.
    pub search_tree: Option<SearchTreeDefinition>,
    pub job_handler: JobHandlerConfig,
    pub grace_handler: GraceHandlerConfig,
    pub attack_point_optimizer: OptimizerConfig,
    pub attach_tempo_marks: bool,
    /// Keyed by beat index.
    pub overrides: BTreeMap<usize, OverrideConfig>,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            tempo: TempoConfig::default(),
            beatspan: Duration::new(1, 4),
            search_tree: None,
            job_handler: JobHandlerConfig::default(),
            grace_handler: GraceHandlerConfig::default(),
            attack_point_optimizer: OptimizerConfig::default(),
            attach_tempo_marks: true,
            overrides: BTreeMap::new(),
        }
    }
}

impl QuantizerConfig {
    /// Reads YAML (`.yaml`, `.yml`) or JSON (`.json`) and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuantizeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&text)?,
            Some("json") => Self::from_json(&text)?,
            _ => {
                return Err(QuantizeError::configuration(format!(
                    "unsupported config format for {}",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, QuantizeError> {
        serde_yaml::from_str(text).map_err(|err| QuantizeError::Serialization(err.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, QuantizeError> {
        serde_json::from_str(text).map_err(|err| QuantizeError::Serialization(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), QuantizeError> {
        self.schema()?;
        self.options()?;
        Ok(())
    }

    pub fn schema(&self) -> Result<BeatwiseQSchema, QuantizeError> {
        let search_tree = match &self.search_tree {
            Some(definition) => SearchTree::new(definition.clone())?,
            None => SearchTree::default(),
        };
        let mut schema =
            BeatwiseQSchema::new(self.beatspan, search_tree, self.tempo.tempo_mark()?)?;
        for (&beat, item) in &self.overrides {
            let item = BeatwiseQSchemaItem {
                beatspan: item.beatspan,
                search_tree: item
                    .search_tree
                    .clone()
                    .map(SearchTree::new)
                    .transpose()?,
                tempo: item.tempo.as_ref().map(TempoConfig::tempo_mark).transpose()?,
            };
            schema = schema.with_override(beat, item)?;
        }
        Ok(schema)
    }

    pub fn options(&self) -> Result<QuantizeOptions, QuantizeError> {
        let job_handler: Box<dyn JobHandler> = match &self.job_handler {
            JobHandlerConfig::Serial => Box::new(SerialJobHandler::new()),
            JobHandlerConfig::Parallel {
                workers,
                timeout_ms,
            } => {
                let mut handler = ParallelJobHandler::new(*workers)?;
                if let Some(timeout_ms) = timeout_ms {
                    handler = handler.with_timeout(WallDuration::from_millis(*timeout_ms));
                }
                Box::new(handler)
            }
        };
        let grace_handler: Box<dyn GraceHandler> = match &self.grace_handler {
            GraceHandlerConfig::Concatenating {
                grace_duration,
                discard_grace_rest,
            } => {
                if !is_assignable(*grace_duration) {
                    return Err(QuantizeError::configuration(format!(
                        "grace duration {} is not a single note value",
                        grace_duration
                    )));
                }
                Box::new(ConcatenatingGraceHandler {
                    grace_duration: *grace_duration,
                    discard_grace_rest: *discard_grace_rest,
                })
            }
            GraceHandlerConfig::Discarding => Box::new(DiscardingGraceHandler),
            GraceHandlerConfig::Collapsing => Box::new(CollapsingGraceHandler),
        };
        let attack_point_optimizer: Box<dyn AttackPointOptimizer> = match self.attack_point_optimizer
        {
            OptimizerConfig::Naive => Box::new(NaiveAttackPointOptimizer),
            OptimizerConfig::Null => Box::new(NullAttackPointOptimizer),
        };
        Ok(QuantizeOptions {
            grace_handler,
            heuristic: Box::new(DistanceHeuristic),
            job_handler,
            attack_point_optimizer,
            attach_tempo_marks: self.attach_tempo_marks,
        })
    }
}

mod ratio_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use tactus_domain::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.trim()
            .parse::<Duration>()
            .map_err(|err| de::Error::custom(format!("invalid duration {:?}: {}", text, err)))
    }
}

mod optional_ratio_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use tactus_domain::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.collect_str(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        text.trim()
            .parse::<Duration>()
            .map(Some)
            .map_err(|err| de::Error::custom(format!("invalid duration {:?}: {}", text, err)))
    }
}
