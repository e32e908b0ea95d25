pub mod app_config;
pub mod database;
pub mod sources;
pub mod validation;

pub use app_config::*;
pub use database::*;
pub use sources::ConfigSource;
pub use validation::*;
