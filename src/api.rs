//! HTTP API for the assistant chat view

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::session::SharedController;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: SharedController,
    /// Cancelled on shutdown so open event streams end
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(controller: SharedController, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            shutdown,
        }
    }
}
