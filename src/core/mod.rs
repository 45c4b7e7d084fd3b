pub mod geo;
pub mod place;

pub use geo::*;
pub use place::*;
