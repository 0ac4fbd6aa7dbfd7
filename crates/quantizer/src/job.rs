use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{JobError, JobErrorKind};
use crate::proxy::QEventProxy;
use crate::q_grid::QGrid;
use crate::search_tree::SearchTree;

/// Shared flag that stops running jobs at their next expansion step.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default)]
pub struct JobLimits {
    /// Wall-clock budget for a single job.
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl JobLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn check(&self, started: Instant) -> Result<(), JobErrorKind> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(JobErrorKind::Cancelled);
        }
        if self.timeout.is_some_and(|timeout| started.elapsed() >= timeout) {
            return Err(JobErrorKind::TimedOut);
        }
        Ok(())
    }
}

/// One beat's worth of work: every grid the search tree permits for these
/// proxies. Running a job is a pure function of its inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuantizationJob {
    job_id: usize,
    search_tree: SearchTree,
    q_event_proxies: Vec<QEventProxy>,
    q_grids: Vec<QGrid>,
}

impl QuantizationJob {
    pub fn new(job_id: usize, search_tree: SearchTree, q_event_proxies: Vec<QEventProxy>) -> Self {
        Self {
            job_id,
            search_tree,
            q_event_proxies,
            q_grids: Vec::new(),
        }
    }

    pub fn job_id(&self) -> usize {
        self.job_id
    }

    pub fn search_tree(&self) -> &SearchTree {
        &self.search_tree
    }

    pub fn q_event_proxies(&self) -> &[QEventProxy] {
        &self.q_event_proxies
    }

    /// Grids generated by the last run, root grid first, then depth-first
    /// with the most recently generated candidate expanded next.
    pub fn q_grids(&self) -> &[QGrid] {
        &self.q_grids
    }

    pub fn into_q_grids(self) -> Vec<QGrid> {
        self.q_grids
    }

    pub fn run(&mut self, limits: &JobLimits) -> Result<(), JobError> {
        let job_id = self.job_id;
        let started = Instant::now();
        let mut root = QGrid::new();
        root.fit_q_events(&self.q_event_proxies)
            .map_err(|kind| JobError::new(job_id, kind))?;

        let mut pending = vec![root];
        let mut finished = Vec::new();
        while let Some(q_grid) = pending.pop() {
            limits
                .check(started)
                .map_err(|kind| JobError::new(job_id, kind))?;
            let expanded = self
                .search_tree
                .expand(&q_grid, &self.q_event_proxies)
                .map_err(|kind| JobError::new(job_id, kind))?;
            pending.extend(expanded);
            finished.push(q_grid);
        }
        debug!(job_id, candidates = finished.len(), "quantization job finished");
        self.q_grids = finished;
        Ok(())
    }
}

impl PartialEq for QuantizationJob {
    fn eq(&self, other: &Self) -> bool {
        self.job_id == other.job_id
            && self.search_tree == other.search_tree
            && self.q_event_proxies == other.q_event_proxies
    }
}

impl Eq for QuantizationJob {}
