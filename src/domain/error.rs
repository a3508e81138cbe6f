// Error taxonomy - every failure here is recovered without ending the session
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    #[error("no bearer token available")]
    MissingToken,
    #[error("connection is not open")]
    NotConnected,
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    MalformedJson(String),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("frame carries nothing this client understands")]
    UnrecognizedFrame,
    #[error("notification without a forecast for the {0}s horizon")]
    MissingAlertHorizon(u32),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceError {
    #[error("no samples in the rolling window")]
    EmptyWindow,
    #[error("classifier call failed: {0}")]
    Classifier(String),
    #[error("sequence predictor call failed: {0}")]
    Predictor(String),
    #[error("classifier returned unknown cluster {0}")]
    UnknownCluster(i64),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SelectionError {
    #[error("horizon candidate set is empty")]
    EmptyCandidateSet,
}
