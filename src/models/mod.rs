pub mod change;
pub mod cookie;
pub mod item;
pub mod snapshot;

// Re-exports for convenience
pub use change::*;
pub use cookie::*;
pub use item::*;
pub use snapshot::*;
