pub mod aggregate;
pub mod config;
pub mod context;
pub mod fetch;
pub mod process;
pub mod server;
pub mod shape;
pub mod source;
pub mod store;
pub mod view;

pub use context::{init, DashboardContext};
