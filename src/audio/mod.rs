pub mod player;
pub mod queue;
pub mod registry;

pub use player::{Player, QueueSnapshot};
pub use queue::{GuildQueue, LoopMode, SkipVerdict, Track};
pub use registry::QueueRegistry;
