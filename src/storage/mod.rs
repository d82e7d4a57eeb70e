pub mod collection;
pub mod feedback;
pub mod jobs;
pub mod users;

pub use collection::JsonCollection;
pub use feedback::FeedbackStore;
pub use jobs::JobStore;
pub use users::{NewUser, UserStore};
