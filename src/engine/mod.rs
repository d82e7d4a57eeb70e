pub mod dispatcher;
pub mod progress;
pub mod runner;
pub mod separator;

pub use dispatcher::JobDispatcher;
pub use progress::ProgressTracker;
pub use runner::RunnerDeps;
pub use separator::{
    DemucsSeparator, MockSeparator, SeparationOutcome, SeparatorTool, STEM_EXTENSION, STEM_NAMES,
};
