use std::fmt;

use tactus_domain::Voice;
use tracing::{info, instrument};

use crate::attack_point_optimizer::{AttackPointOptimizer, NaiveAttackPointOptimizer};
use crate::error::QuantizeError;
use crate::grace_handler::{ConcatenatingGraceHandler, GraceHandler};
use crate::heuristic::{DistanceHeuristic, Heuristic};
use crate::job_handler::{JobHandler, SerialJobHandler};
use crate::schema::BeatwiseQSchema;
use crate::sequence::QEventSequence;

/// Pluggable strategies for one quantization run.
pub struct QuantizeOptions {
    pub grace_handler: Box<dyn GraceHandler>,
    pub heuristic: Box<dyn Heuristic>,
    pub job_handler: Box<dyn JobHandler>,
    pub attack_point_optimizer: Box<dyn AttackPointOptimizer>,
    /// Write a tempo mark at the start and wherever the tempo changes.
    pub attach_tempo_marks: bool,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            grace_handler: Box::new(ConcatenatingGraceHandler::default()),
            heuristic: Box::new(DistanceHeuristic),
            job_handler: Box::new(SerialJobHandler::new()),
            attack_point_optimizer: Box::new(NaiveAttackPointOptimizer),
            attach_tempo_marks: true,
        }
    }
}

impl fmt::Debug for QuantizeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizeOptions")
            .field("attach_tempo_marks", &self.attach_tempo_marks)
            .finish_non_exhaustive()
    }
}

pub struct Quantizer {
    options: QuantizeOptions,
}

impl Quantizer {
    pub fn new(options: QuantizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &QuantizeOptions {
        &self.options
    }

    #[instrument(skip_all, fields(events = sequence.len()))]
    pub fn quantize(
        &self,
        sequence: &QEventSequence,
        schema: &BeatwiseQSchema,
    ) -> Result<Voice, QuantizeError> {
        info!(duration_ms = %sequence.duration_in_ms(), "quantizing sequence");
        let target = schema.target_for(sequence.duration_in_ms())?;
        let voice = target.quantize(sequence, &self.options)?;
        info!(
            beats = target.beats().len(),
            leaves = voice.leaves().len(),
            "quantization finished"
        );
        Ok(voice)
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(QuantizeOptions::default())
    }
}
