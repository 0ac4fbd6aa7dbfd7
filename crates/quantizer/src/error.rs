use std::fmt;

use num_rational::Ratio;
use tactus_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantizeError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("malformed q-event sequence: {0}")]
    MalformedSequence(String),
    #[error("{} quantization job(s) failed: {}", .0.len(), JobErrorList(.0))]
    JobsFailed(Vec<JobError>),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl QuantizeError {
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    pub fn malformed<T: Into<String>>(message: T) -> Self {
        Self::MalformedSequence(message.into())
    }

    /// Ids of the failed jobs, when this is an aggregate job failure.
    pub fn failed_job_ids(&self) -> Vec<usize> {
        match self {
            Self::JobsFailed(errors) => errors.iter().map(|e| e.job_id).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobErrorKind {
    /// A proxy's beat-relative offset lies outside the beat.
    Unfittable { offset: Ratio<i64> },
    TimedOut,
    Cancelled,
    Panicked(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("job {job_id}: {kind}")]
pub struct JobError {
    pub job_id: usize,
    pub kind: JobErrorKind,
}

impl JobError {
    pub fn new(job_id: usize, kind: JobErrorKind) -> Self {
        Self { job_id, kind }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unfittable { offset } => {
                write!(f, "proxy offset {} lies outside the beat", offset)
            }
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Panicked(message) => write!(f, "worker panicked: {}", message),
        }
    }
}

struct JobErrorList<'a>(&'a [JobError]);

impl fmt::Display for JobErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lists_every_job() {
        let error = QuantizeError::JobsFailed(vec![
            JobError::new(2, JobErrorKind::TimedOut),
            JobError::new(5, JobErrorKind::Cancelled),
        ]);
        assert_eq!(error.failed_job_ids(), vec![2, 5]);
        assert_eq!(
            error.to_string(),
            "2 quantization job(s) failed: job 2: timed out; job 5: cancelled"
        );
    }
}
