pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod frontend;
pub mod handlers;
pub mod handoff;
pub mod model_registry;
pub mod relay;
pub mod upstream;
