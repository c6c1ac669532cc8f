//! StyleLens Server
//!
//! HTTP front end for fashion style prediction. Clients upload a photo and a
//! gender key to `POST /predict` and receive the predicted style label, the
//! top-class confidence, and the full probability distribution.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::{ListenConfig, ResponseConfig, ServerConfig};
pub use routes::create_router;
pub use state::AppState;
