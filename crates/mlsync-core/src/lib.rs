pub mod config;
pub mod logging;

pub mod api;
pub mod auth;
pub mod control;
pub mod cycle;
pub mod mapper;
pub mod retry;
pub mod secret;
pub mod store;
pub mod transport;
