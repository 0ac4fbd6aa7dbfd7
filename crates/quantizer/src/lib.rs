pub mod attack_point_optimizer;
pub mod config;
pub mod error;
pub mod grace_handler;
pub mod heuristic;
pub mod job;
pub mod job_handler;
pub mod pipeline;
pub mod proxy;
pub mod q_event;
pub mod q_grid;
pub mod schema;
pub mod search_tree;
pub mod sequence;
pub mod target;

pub use attack_point_optimizer::{
    AttackPointOptimizer, NaiveAttackPointOptimizer, NullAttackPointOptimizer,
};
pub use config::{OverrideConfig, QuantizerConfig};
pub use error::{JobError, JobErrorKind, QuantizeError};
pub use grace_handler::{
    CollapsingGraceHandler, ConcatenatingGraceHandler, DiscardingGraceHandler, GraceHandler,
};
pub use heuristic::{DistanceHeuristic, Heuristic};
pub use job::{CancellationToken, JobLimits, QuantizationJob};
pub use job_handler::{JobHandler, ParallelJobHandler, SerialJobHandler};
pub use pipeline::{QuantizeOptions, Quantizer};
pub use proxy::QEventProxy;
pub use q_event::{millis, Millis, QEvent};
pub use q_grid::{Division, QGrid, QGridLeaf};
pub use schema::{BeatwiseQSchema, BeatwiseQSchemaItem, ResolvedBeat};
pub use search_tree::{SearchTree, SearchTreeDefinition};
pub use sequence::QEventSequence;
pub use target::{QTarget, QTargetBeat, QTargetState};
