pub mod error;

pub use error::{AppError, ExtractionError, NavigationError, NotificationError, Result, SessionError};
