pub mod guild;

pub use guild::{handle_guild_create, handle_ready};
