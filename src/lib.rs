pub mod actions;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod fanout;
pub mod graph;
pub mod relay;
pub mod store;

pub use relay::Relay;
