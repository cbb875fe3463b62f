pub mod comments;
pub mod read_tracking;

pub use comments::CommentService;
pub use read_tracking::ReadTracker;
