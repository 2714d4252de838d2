//! HTTP API handlers

pub mod health;
pub mod reconcile;
pub mod stats;

pub use health::health_routes;
pub use reconcile::reconcile_routes;
pub use stats::stats_routes;
