//! # Mailtally Server
//!
//! HTTP front end for [`mailtally_core`]: upload a gzip-compressed tar of
//! email files to `POST /start`, then poll `GET /status` and
//! `GET /top-senders` while the archive is ingested in the background.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
