//! HTTP API and web form.
//!
//! ## Endpoints
//!
//! - `GET /` - Research form
//! - `GET /api/health` - Health check
//! - `GET /api/models` - Model registry, in picker order
//! - `GET /api/tools` - Research tools
//! - `POST /api/session` - Start a session
//! - `GET /api/session/:id/credentials` - Providers with a key
//! - `PUT /api/session/:id/credentials` - Set or clear provider keys
//! - `DELETE /api/session/:id` - End a session and drop its keys
//! - `POST /api/session/:id/query` - Run a research query

mod routes;
pub mod types;

pub use routes::{app, serve, AppState};
pub use types::*;
