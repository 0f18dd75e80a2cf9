pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod debug;
pub mod health;
pub mod node;
pub mod perf;
pub mod placement;
pub mod recovery;
pub mod routes;
pub mod server;
pub mod state;
pub mod transfer;
