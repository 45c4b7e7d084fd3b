pub mod payload;
pub mod resource;

pub use payload::PayloadFile;
pub use resource::{DirRoot, ResourceResolver, ResourceRoot};
