//! Shared foundation for the Buntime workspace: the error taxonomy every
//! layer converts into, environment-driven configuration, the identity type
//! used to key apps and workers, and process-wide logging setup.

pub mod config;
pub mod error;
pub mod ident;
pub mod layers;

pub use config::{BuntimeConfig, ConfigError};
pub use error::{set_production_mode, BuntimeError};
pub use ident::AppIdent;
pub use layers::init_tracing;
