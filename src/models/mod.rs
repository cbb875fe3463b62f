pub mod comment;
pub mod error;
pub mod messages;
pub mod presence;
pub mod read_status;

pub use comment::*;
pub use error::*;
pub use messages::*;
pub use presence::*;
pub use read_status::*;
