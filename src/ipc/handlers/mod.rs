pub mod auth;
pub mod core;
pub mod data;
pub mod results;
