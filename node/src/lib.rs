pub mod agent;
pub mod client;
pub mod health;
pub mod transfer;
