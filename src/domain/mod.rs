// Domain layer - Plain data types shared by every component
pub mod alert;
pub mod error;
pub mod forecast;
pub mod telemetry;
