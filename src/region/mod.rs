pub mod crs;
pub mod error;
pub mod geocode;
pub mod model;
pub mod resolver;
mod source;
