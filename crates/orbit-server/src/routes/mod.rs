// Export route modules
pub mod generation;
pub mod health;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(generation::routes(state))
        .merge(health::routes())
}
