pub mod auth;
pub mod community;
pub mod error;
pub mod favorites;
pub mod mail;
pub mod middleware;
pub mod missions;
pub mod router;
pub mod state;
pub mod submissions;
pub mod users;
pub mod validation;

#[cfg(test)]
mod tests;

pub use router::router;
pub use state::{AppState, AppStateInner};
