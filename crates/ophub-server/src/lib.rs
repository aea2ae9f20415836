pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod security;
pub mod state;
pub mod tasks;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;
