pub mod connection;
pub mod dispatcher;

pub use connection::GatewayContext;
pub use dispatcher::{Audience, Dispatcher};
