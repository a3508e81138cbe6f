// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod hydrai_client;
pub mod notifier;
pub mod ws_transport;
