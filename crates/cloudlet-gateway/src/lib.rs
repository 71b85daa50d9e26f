//! HTTP surface for cloudlet server actions and discovery status

pub mod handlers;

pub use handlers::{cloudlet_routes, AppError, AppState};
