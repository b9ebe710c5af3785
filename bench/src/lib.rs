pub mod actors;
pub mod args;
pub mod backends;
pub mod config;
pub mod counter;
pub mod error;
pub mod logging;
pub mod pubsub;
pub mod runner;
pub mod utils;
