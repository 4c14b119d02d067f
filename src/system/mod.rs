pub mod config;
pub mod events;
pub mod storage;

pub use config::*;
pub use events::*;
pub use storage::*;
