//! Cross-tab data synchronization and change notification for the quote
//! management client.
pub mod activity;
pub mod api;
pub mod bus;
pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod notifier;
pub mod poller;
pub mod session;
pub mod store;
pub mod task;
pub mod views;
