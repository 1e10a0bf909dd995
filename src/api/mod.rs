pub mod handlers;
pub mod params_extractor;
pub mod routes;
pub mod user_extractor;

pub use handlers::*;
pub use routes::*;
