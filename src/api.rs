//! HTTP API for the bot
//!
//! The channel connector posts activities here; each request runs one turn
//! and answers with everything the bot said during it.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::runtime::ProductionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ProductionManager>,
}

impl AppState {
    pub fn new(runtime: ProductionManager) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }
}
