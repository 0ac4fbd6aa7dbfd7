//! The quantization pass over a whole sequence.
//!
//! A `QTarget` owns the beats of a piece. Quantizing a sequence runs five
//! stages in order: events are bucketed into beats (collecting), one job per
//! non-empty beat goes to the job handler (dispatched), the heuristic picks
//! a grid per beat (scored), events that snapped to a beat's closing
//! boundary move onto the next beat or onto a closing beat appended after
//! the last one (stitched), and finally the grids are turned into a voice
//! (notated).

use std::fmt;

use tactus_domain::{Duration, LeafKind, TempoMark, Voice};
use tracing::{debug, instrument};

use crate::error::QuantizeError;
use crate::job::QuantizationJob;
use crate::pipeline::QuantizeOptions;
use crate::proxy::QEventProxy;
use crate::q_event::{Millis, QEvent};
use crate::q_grid::QGrid;
use crate::search_tree::SearchTree;
use crate::sequence::QEventSequence;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QTargetState {
    Collecting,
    Dispatched,
    Scored,
    Stitched,
    Notated,
}

impl fmt::Display for QTargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Collecting => "collecting",
            Self::Dispatched => "dispatched",
            Self::Scored => "scored",
            Self::Stitched => "stitched",
            Self::Notated => "notated",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QTargetBeat {
    pub beatspan: Duration,
    pub offset_in_ms: Millis,
    pub duration_in_ms: Millis,
    pub search_tree: SearchTree,
    pub tempo: TempoMark,
    pub q_events: Vec<QEvent>,
    /// Candidates produced by this beat's job, in generation order.
    pub q_grids: Vec<QGrid>,
    pub q_grid: Option<QGrid>,
}

impl QTargetBeat {
    pub fn new(
        beatspan: Duration,
        offset_in_ms: Millis,
        duration_in_ms: Millis,
        search_tree: SearchTree,
        tempo: TempoMark,
    ) -> Self {
        Self {
            beatspan,
            offset_in_ms,
            duration_in_ms,
            search_tree,
            tempo,
            q_events: Vec::new(),
            q_grids: Vec::new(),
            q_grid: None,
        }
    }

    pub fn q_event_proxies(&self) -> Vec<QEventProxy> {
        self.q_events
            .iter()
            .map(|q_event| {
                QEventProxy::in_beat(q_event.clone(), self.offset_in_ms, self.duration_in_ms)
            })
            .collect()
    }

    /// The job for this beat, or `None` when no events fell in it.
    pub fn job(&self, job_id: usize) -> Option<QuantizationJob> {
        if self.q_events.is_empty() {
            return None;
        }
        Some(QuantizationJob::new(
            job_id,
            self.search_tree.clone(),
            self.q_event_proxies(),
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QTarget {
    beats: Vec<QTargetBeat>,
}

impl QTarget {
    pub fn new(mut beats: Vec<QTargetBeat>) -> Result<Self, QuantizeError> {
        if beats.is_empty() {
            return Err(QuantizeError::configuration("a target needs at least one beat"));
        }
        for beat in &beats {
            if beat.duration_in_ms <= Millis::from_integer(0) {
                return Err(QuantizeError::configuration(format!(
                    "beat at {} ms has non-positive duration",
                    beat.offset_in_ms
                )));
            }
        }
        beats.sort_by(|a, b| a.offset_in_ms.cmp(&b.offset_in_ms));
        Ok(Self { beats })
    }

    pub fn beats(&self) -> &[QTargetBeat] {
        &self.beats
    }

    pub fn duration_in_ms(&self) -> Millis {
        self.beats
            .last()
            .map(|beat| beat.offset_in_ms + beat.duration_in_ms)
            .unwrap_or_else(|| Millis::from_integer(0))
    }

    #[instrument(skip_all, fields(beats = self.beats.len(), events = sequence.len()))]
    pub fn quantize(
        &self,
        sequence: &QEventSequence,
        options: &QuantizeOptions,
    ) -> Result<Voice, QuantizeError> {
        let beats = self.quantize_beats(sequence, options)?;
        let voice = notate(&beats, options)?;
        debug!(state = %QTargetState::Notated, leaves = voice.leaves().len());
        Ok(voice)
    }

    /// Runs every stage up to and including stitching, returning the beats
    /// with their chosen grids.
    pub fn quantize_beats(
        &self,
        sequence: &QEventSequence,
        options: &QuantizeOptions,
    ) -> Result<Vec<QTargetBeat>, QuantizeError> {
        let mut beats = self.beats.clone();
        collect(&mut beats, sequence)?;
        debug!(state = %QTargetState::Collecting, beats = beats.len());

        let jobs: Vec<QuantizationJob> = beats
            .iter()
            .enumerate()
            .filter_map(|(index, beat)| beat.job(index))
            .collect();
        debug!(state = %QTargetState::Dispatched, jobs = jobs.len());
        for job in options.job_handler.handle(jobs)? {
            let job_id = job.job_id();
            if let Some(beat) = beats.get_mut(job_id) {
                beat.q_grids = job.into_q_grids();
            }
        }

        options.heuristic.select(&mut beats);
        debug!(state = %QTargetState::Scored);

        stitch(&mut beats);
        debug!(state = %QTargetState::Stitched);
        Ok(beats)
    }
}

fn collect(beats: &mut [QTargetBeat], sequence: &QEventSequence) -> Result<(), QuantizeError> {
    let mut events = sequence.events();
    // A trailing silence would otherwise be split against the terminal
    // event into a tuplet of rests.
    if events.len() >= 2 && events[events.len() - 2].is_silent() {
        events = &events[..events.len() - 1];
    }
    for q_event in events {
        let index = beats.partition_point(|beat| beat.offset_in_ms <= q_event.offset());
        if index == 0 {
            return Err(QuantizeError::malformed(format!(
                "event at {} ms starts before the first beat",
                q_event.offset()
            )));
        }
        beats[index - 1].q_events.push(q_event.clone());
    }
    Ok(())
}

fn stitch(beats: &mut Vec<QTargetBeat>) {
    for index in 0..beats.len() {
        let carried = match beats[index].q_grid.as_mut() {
            Some(q_grid) => std::mem::take(&mut q_grid.next_downbeat_mut().q_event_proxies),
            None => continue,
        };
        if carried.is_empty() {
            continue;
        }
        if index + 1 == beats.len() {
            let q_events: Vec<QEvent> = carried
                .into_iter()
                .map(|proxy| proxy.q_event)
                .filter(|q_event| !q_event.is_terminal())
                .collect();
            if let Some(closing) = closing_beat(&beats[index], q_events) {
                debug!(
                    offset_ms = %closing.offset_in_ms,
                    events = closing.q_events.len(),
                    "adding a closing beat for events on the final downbeat"
                );
                beats.push(closing);
            }
            continue;
        }
        let next = &mut beats[index + 1];
        let (offset, duration) = (next.offset_in_ms, next.duration_in_ms);
        if let Some(first) = next
            .q_grid
            .as_mut()
            .and_then(|q_grid| q_grid.leaves_mut().first_mut())
        {
            let mut moved: Vec<QEventProxy> = carried
                .into_iter()
                .map(|proxy| QEventProxy::in_beat(proxy.q_event, offset, duration))
                .collect();
            moved.append(&mut first.q_event_proxies);
            first.q_event_proxies = moved;
        }
    }
}

/// A single-leaf beat after `last` holding `q_events` on its downbeat.
fn closing_beat(last: &QTargetBeat, q_events: Vec<QEvent>) -> Option<QTargetBeat> {
    if q_events.is_empty() {
        return None;
    }
    let mut beat = QTargetBeat::new(
        last.beatspan,
        last.offset_in_ms + last.duration_in_ms,
        last.duration_in_ms,
        last.search_tree.clone(),
        last.tempo,
    );
    beat.q_events = q_events;
    let proxies = beat.q_event_proxies();
    let mut q_grid = QGrid::new();
    if let Some(first) = q_grid.leaves_mut().first_mut() {
        first.q_event_proxies = proxies;
    }
    beat.q_grid = Some(q_grid);
    Some(beat)
}

fn notate(beats: &[QTargetBeat], options: &QuantizeOptions) -> Result<Voice, QuantizeError> {
    let mut voice = Voice::new();
    let mut annotations: Vec<Option<Vec<QEvent>>> = Vec::new();
    let mut tempo_leaves: Vec<(usize, TempoMark)> = Vec::new();
    let mut previous_tempo: Option<TempoMark> = None;

    for beat in beats {
        let q_grid = beat.q_grid.clone().unwrap_or_default();
        let (components, beat_annotations) = q_grid.to_components(beat.beatspan);
        if options.attach_tempo_marks && previous_tempo != Some(beat.tempo) {
            tempo_leaves.push((annotations.len(), beat.tempo));
        }
        previous_tempo = Some(beat.tempo);
        annotations.extend(beat_annotations);
        voice.extend(components);
    }

    let mut leaves = voice.leaves_mut();
    if leaves.len() != annotations.len() {
        return Err(QuantizeError::malformed(format!(
            "notated {} leaves for {} attack points",
            leaves.len(),
            annotations.len()
        )));
    }
    for (index, annotation) in annotations.iter().enumerate() {
        match annotation {
            Some(q_events) => {
                let (pitches, grace) = options.grace_handler.handle(q_events);
                let leaf = &mut leaves[index];
                leaf.kind = LeafKind::from_pitches(pitches);
                leaf.grace = grace;
                leaf.attachments = gather_attachments(q_events);
            }
            None if index > 0 => {
                let kind = leaves[index - 1].kind.clone();
                leaves[index - 1].tied = true;
                leaves[index].kind = kind;
            }
            None => leaves[index].kind = LeafKind::Rest,
        }
    }
    for (index, tempo) in tempo_leaves {
        if let Some(leaf) = leaves.get_mut(index) {
            leaf.tempo = Some(tempo);
        }
    }

    options.attack_point_optimizer.optimize(&mut voice);
    Ok(voice)
}

fn gather_attachments(q_events: &[QEvent]) -> Vec<String> {
    let mut attachments: Vec<String> = Vec::new();
    for attachment in q_events.iter().flat_map(QEvent::attachments) {
        if !attachments.contains(attachment) {
            attachments.push(attachment.clone());
        }
    }
    attachments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_point_optimizer::NullAttackPointOptimizer;
    use crate::q_event::millis;
    use crate::schema::BeatwiseQSchema;
    use tactus_domain::Pitch;

    fn plain_options() -> QuantizeOptions {
        QuantizeOptions {
            attack_point_optimizer: Box::new(NullAttackPointOptimizer),
            ..QuantizeOptions::default()
        }
    }

    fn sequence(pairs: &[(f64, Option<Vec<Pitch>>)]) -> QEventSequence {
        QEventSequence::from_millisecond_pitch_pairs(pairs).unwrap()
    }

    #[test]
    fn target_sorts_beats_by_offset() {
        let beat = |offset: i64| {
            QTargetBeat::new(
                Duration::new(1, 4),
                millis(offset),
                millis(1000),
                SearchTree::default(),
                TempoMark::quarter(60).unwrap(),
            )
        };
        let target = QTarget::new(vec![beat(2000), beat(0), beat(1000)]).unwrap();
        let offsets: Vec<Millis> = target.beats().iter().map(|b| b.offset_in_ms).collect();
        assert_eq!(offsets, vec![millis(0), millis(1000), millis(2000)]);
        assert_eq!(target.duration_in_ms(), millis(3000));
        assert!(QTarget::new(Vec::new()).is_err());
    }

    #[test]
    fn events_are_bucketed_by_beat() {
        let sequence = sequence(&[(500.0, Some(vec![Pitch(0)])), (1000.0, Some(vec![Pitch(2)]))]);
        let target = BeatwiseQSchema::default().target_for(sequence.duration_in_ms()).unwrap();
        let beats = target.quantize_beats(&sequence, &plain_options()).unwrap();
        let counts: Vec<usize> = beats.iter().map(|beat| beat.q_events.len()).collect();
        assert_eq!(counts, vec![2, 1]);
        assert!(beats.iter().all(|beat| beat.q_grid.is_some()));
    }

    #[test]
    fn ties_carry_pitches_across_beats() {
        let sequence = sequence(&[(1500.0, Some(vec![Pitch(4)])), (500.0, Some(vec![Pitch(5)]))]);
        let target = BeatwiseQSchema::default().target_for(sequence.duration_in_ms()).unwrap();
        let voice = target.quantize(&sequence, &plain_options()).unwrap();
        let leaves = voice.leaves();
        assert_eq!(leaves[0].kind, LeafKind::Note(Pitch(4)));
        assert!(leaves[0].tied);
        assert_eq!(leaves[1].kind, LeafKind::Note(Pitch(4)));
        assert!(!leaves[1].tied);
        assert_eq!(leaves[2].kind, LeafKind::Note(Pitch(5)));
        assert_eq!(voice.duration(), Duration::new(1, 2));
    }

    #[test]
    fn tempo_mark_only_on_first_leaf_without_changes() {
        let sequence = sequence(&[(1000.0, Some(vec![Pitch(0)])), (1000.0, Some(vec![Pitch(2)]))]);
        let target = BeatwiseQSchema::default().target_for(sequence.duration_in_ms()).unwrap();
        let voice = target.quantize(&sequence, &plain_options()).unwrap();
        let marks: Vec<bool> = voice.leaves().iter().map(|leaf| leaf.tempo.is_some()).collect();
        assert_eq!(marks, vec![true, false]);

        let options = QuantizeOptions {
            attach_tempo_marks: false,
            ..plain_options()
        };
        let voice = target.quantize(&sequence, &options).unwrap();
        assert!(voice.leaves().iter().all(|leaf| leaf.tempo.is_none()));
    }

    #[test]
    fn events_on_the_final_downbeat_get_a_closing_beat() {
        let events = vec![
            QEvent::pitched(millis(0), [Pitch(0)]),
            QEvent::pitched(millis(990), [Pitch(2)]),
            QEvent::terminal(millis(1000)),
        ];
        let sequence = QEventSequence::new(events).unwrap();
        let target = BeatwiseQSchema::default().target_for(sequence.duration_in_ms()).unwrap();
        assert_eq!(target.beats().len(), 1);

        let beats = target.quantize_beats(&sequence, &plain_options()).unwrap();
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[1].offset_in_ms, millis(1000));
        assert_eq!(beats[1].q_events, vec![QEvent::pitched(millis(990), [Pitch(2)])]);

        let voice = target.quantize(&sequence, &plain_options()).unwrap();
        let kinds: Vec<LeafKind> = voice.leaves().iter().map(|leaf| leaf.kind.clone()).collect();
        assert_eq!(kinds, vec![LeafKind::Note(Pitch(0)), LeafKind::Note(Pitch(2))]);
        assert_eq!(voice.duration(), Duration::new(1, 2));
    }

    #[test]
    fn terminal_on_the_final_downbeat_adds_nothing() {
        let sequence = sequence(&[(1000.0, Some(vec![Pitch(0)]))]);
        let target = BeatwiseQSchema::default().target_for(sequence.duration_in_ms()).unwrap();
        let beats = target.quantize_beats(&sequence, &plain_options()).unwrap();
        assert_eq!(beats.len(), 1);
    }

    #[test]
    fn attachments_reach_the_leaf() {
        let events = vec![
            QEvent::pitched(millis(0), [Pitch(0)]).with_attachments(["\\fermata"]),
            QEvent::terminal(millis(1000)),
        ];
        let sequence = QEventSequence::new(events).unwrap();
        let target = BeatwiseQSchema::default().target_for(sequence.duration_in_ms()).unwrap();
        let voice = target.quantize(&sequence, &plain_options()).unwrap();
        assert_eq!(voice.leaves()[0].attachments, vec!["\\fermata".to_string()]);
    }
}
