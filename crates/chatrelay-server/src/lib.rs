pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod hub;
pub mod logging;
pub mod server;
pub mod state;

pub use config::{ProviderKind, ServerConfig};
pub use error::AppError;
pub use server::{app_config, run_server};
pub use state::AppState;
