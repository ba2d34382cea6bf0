//! HTTP server for Notary.
//!
//! Exposes registration, status, verification, and credit endpoints over
//! in-memory backends, and runs the calendar sealer and the registration
//! sweeper in the background.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Action, AuthProvider, BearerAuth, Credentials, Identity};
pub use config::{
    CalendarSection, ClientSection, CreditsSection, PipelineSection, ServerConfig, VerifySection,
};
pub use error::{ApiError, ServerError, ServerResult};
pub use server::{BackgroundTasks, NotaryServer};
pub use state::AppState;
