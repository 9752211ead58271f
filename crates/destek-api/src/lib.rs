pub mod auth;
pub mod chat;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod routes;
pub mod state;
pub mod tickets;

pub use routes::router;
pub use state::{AppState, AppStateInner};
