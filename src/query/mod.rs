pub mod engine;
pub mod preheat;
pub mod select;
pub mod server;

pub use engine::*;
pub use preheat::*;
pub use select::*;
pub use server::*;
