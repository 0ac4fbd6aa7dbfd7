use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{JobError, JobErrorKind, QuantizeError};
use crate::job::{CancellationToken, JobLimits, QuantizationJob};

/// Runs a batch of quantization jobs. Every job runs to completion or
/// failure; failures are reported together once the batch is done.
pub trait JobHandler: Send + Sync {
    fn handle(&self, jobs: Vec<QuantizationJob>) -> Result<Vec<QuantizationJob>, QuantizeError>;
}

/// Runs jobs one after another on the calling thread.
#[derive(Clone, Debug, Default)]
pub struct SerialJobHandler {
    pub limits: JobLimits,
}

impl SerialJobHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobHandler for SerialJobHandler {
    fn handle(
        &self,
        mut jobs: Vec<QuantizationJob>,
    ) -> Result<Vec<QuantizationJob>, QuantizeError> {
        debug!(jobs = jobs.len(), "running quantization jobs serially");
        let failures: Vec<JobError> = jobs
            .iter_mut()
            .filter_map(|job| job.run(&self.limits).err())
            .collect();
        collect_results(jobs, failures)
    }
}

/// Runs jobs on a fixed-size worker pool. Results stay in input order and a
/// panicking job is reported as that job's failure.
#[derive(Clone, Debug)]
pub struct ParallelJobHandler {
    workers: usize,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
    pool: Arc<rayon::ThreadPool>,
}

impl ParallelJobHandler {
    pub fn new(workers: usize) -> Result<Self, QuantizeError> {
        if workers == 0 {
            return Err(QuantizeError::configuration(
                "parallel job handler needs at least one worker",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("quantize-worker-{}", index))
            .build()
            .map_err(|err| QuantizeError::configuration(err.to_string()))?;
        Ok(Self {
            workers,
            timeout: None,
            cancellation: CancellationToken::new(),
            pool: Arc::new(pool),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Cancelling the returned token makes in-flight and queued jobs fail
    /// with `JobErrorKind::Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

impl JobHandler for ParallelJobHandler {
    fn handle(
        &self,
        mut jobs: Vec<QuantizationJob>,
    ) -> Result<Vec<QuantizationJob>, QuantizeError> {
        debug!(
            jobs = jobs.len(),
            workers = self.workers,
            "running quantization jobs in parallel"
        );
        let limits = JobLimits {
            timeout: self.timeout,
            cancellation: Some(self.cancellation.clone()),
        };
        let failures: Vec<JobError> = self.pool.install(|| {
            jobs.par_iter_mut()
                .filter_map(|job| {
                    let job_id = job.job_id();
                    match panic::catch_unwind(AssertUnwindSafe(|| job.run(&limits))) {
                        Ok(result) => result.err(),
                        Err(payload) => Some(JobError::new(
                            job_id,
                            JobErrorKind::Panicked(panic_message(payload.as_ref())),
                        )),
                    }
                })
                .collect()
        });
        collect_results(jobs, failures)
    }
}

fn collect_results(
    jobs: Vec<QuantizationJob>,
    failures: Vec<JobError>,
) -> Result<Vec<QuantizationJob>, QuantizeError> {
    if failures.is_empty() {
        return Ok(jobs);
    }
    for failure in &failures {
        warn!(job_id = failure.job_id, error = %failure.kind, "quantization job failed");
    }
    Err(QuantizeError::JobsFailed(failures))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
