pub mod base;
pub mod logging;
pub mod node;

pub use base::*;
pub use logging::*;
pub use node::*;
