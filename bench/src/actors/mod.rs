pub mod consumer;
pub mod progress;
pub mod publisher;
