pub mod attendance;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod notify;
pub mod retry;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
