//! Pipeline routing: typed job kinds to ordered generation stages.

pub mod progress;
pub mod router;
pub mod stages;
pub mod story;

pub use progress::ProgressReporter;
pub use router::{JobOutcome, PipelineRouter};
pub use stages::{PageOutput, Stages, ValidationReport};
