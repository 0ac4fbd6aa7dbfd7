pub mod duration;
pub mod error;
pub mod io;
pub mod notation;
pub mod pitch;
pub mod tempo;

pub use crate::duration::{is_assignable, Duration};
pub use crate::error::DomainError;
pub use crate::io::{ExportFormat, JsonExporter, LilyPondExporter, NotationExporter};
pub use crate::notation::{Component, GraceContainer, Leaf, LeafKind, Tuplet, Voice};
pub use crate::pitch::Pitch;
pub use crate::tempo::TempoMark;
