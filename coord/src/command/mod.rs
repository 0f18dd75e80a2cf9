pub mod repair;
pub mod serve;
pub mod status;
