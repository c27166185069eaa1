mod auth;
mod error;
mod health;
mod monitors;
mod router;
mod state;

pub use router::router;
pub use state::ApiState;
