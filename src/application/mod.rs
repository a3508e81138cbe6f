// Application layer - Session state machines and the traits they drive
pub mod alert_coordinator;
pub mod connection_manager;
pub mod frame_transport;
pub mod horizon_selector;
pub mod inference_pipeline;
pub mod monitor_session;
pub mod notification_dispatcher;
pub mod prediction_service;
pub mod telemetry_decoder;

#[cfg(test)]
pub mod test_support;
