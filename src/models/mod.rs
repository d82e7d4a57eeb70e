pub mod config;
pub mod feedback;
pub mod job;
pub mod progress;
pub mod user;

pub use config::AppConfig;
pub use feedback::Feedback;
pub use job::{
    truncate_error_detail, validate_upload, JobStatus, SeparationJob, ERROR_DETAIL_MAX_CHARS,
};
pub use progress::{JobProgress, ProgressStatus};
pub use user::{User, UserView};
