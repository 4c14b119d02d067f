pub mod brewing;
pub mod recipes;
pub mod system;
pub mod types;

pub use brewing::*;
pub use types::*;
