pub mod completion;
pub mod progress;
pub mod rescale;
pub mod states;
pub mod timeline;

pub use completion::*;
pub use progress::*;
pub use rescale::*;
pub use states::*;
pub use timeline::*;
