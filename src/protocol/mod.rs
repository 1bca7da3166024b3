pub mod events;
pub mod filters;
pub mod gateway;
pub mod info;
pub mod messages;
pub mod player;
pub mod stats;
pub mod tracks;

pub use events::*;
pub use filters::*;
pub use gateway::*;
pub use info::*;
pub use messages::*;
pub use player::*;
pub use stats::*;
pub use tracks::*;
