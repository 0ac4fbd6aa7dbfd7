use num_rational::Ratio;
use tracing::debug;

use crate::q_grid::QGrid;
use crate::target::QTargetBeat;

/// Picks one grid per beat from the candidates its job produced.
pub trait Heuristic: Send + Sync {
    /// Index of the winning candidate, or `None` when there are none.
    fn choose(&self, q_grids: &[QGrid]) -> Option<usize>;

    fn select(&self, beats: &mut [QTargetBeat]) {
        for (index, beat) in beats.iter_mut().enumerate() {
            let chosen = self
                .choose(&beat.q_grids)
                .and_then(|i| beat.q_grids.get(i).cloned())
                .unwrap_or_default();
            debug!(beat = index, q_grid = %chosen.rtm_format(), "selected q-grid");
            beat.q_grid = Some(chosen);
        }
    }
}

/// Prefers the grid whose boundaries sit closest to the events, then the
/// grid with fewer leaves. A grid only replaces the current best when it is
/// strictly better, so full ties keep the earliest candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceHeuristic;

impl Heuristic for DistanceHeuristic {
    fn choose(&self, q_grids: &[QGrid]) -> Option<usize> {
        let mut best: Option<(usize, (Ratio<i64>, usize))> = None;
        for (index, q_grid) in q_grids.iter().enumerate() {
            let key = (q_grid.distance(), q_grid.leaves().len());
            if best.as_ref().map_or(true, |(_, best_key)| key < *best_key) {
                best = Some((index, key));
            }
        }
        best.map(|(index, _)| index)
    }
}
