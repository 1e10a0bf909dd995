pub mod common;
pub mod entity;
pub mod filter;
pub mod outcome;
pub mod params;
pub mod revision;
pub mod schema;
pub mod user_context;

pub use common::*;
pub use entity::*;
pub use filter::*;
pub use outcome::*;
pub use params::*;
pub use revision::*;
pub use schema::*;
pub use user_context::*;
