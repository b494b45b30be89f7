//! Error types for streamgate.

use crate::message::MessageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    // Message construction errors
    #[error(transparent)]
    Message(#[from] MessageError),

    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Engine failed to start: {message}")]
    EngineStartup { message: String },

    // Endpoint errors
    #[error("Invalid endpoint declaration for {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("Unknown endpoint: {endpoint}")]
    UnknownEndpoint { endpoint: String },

    #[error("Channel closed for endpoint {endpoint}")]
    ChannelClosed { endpoint: String },

    #[error("Invalid block: {message}")]
    InvalidBlock { message: String },

    // Front-end request errors
    #[error("Bad request: {message}")]
    Request { message: String },

    // Audio file errors
    #[error("Failed to read audio: {message}")]
    Audio { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// True for the closed-channel failure observed during teardown races.
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, ExchangeError::ChannelClosed { .. })
    }

    pub(crate) fn closed(endpoint: &str) -> Self {
        ExchangeError::ChannelClosed {
            endpoint: endpoint.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = ExchangeError::ConfigFileNotFound {
            path: "/path/to/engine.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/engine.toml"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = ExchangeError::ConfigInvalidValue {
            key: "engine.input_capacity".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for engine.input_capacity: must be positive"
        );
    }

    #[test]
    fn test_engine_startup_display() {
        let error = ExchangeError::EngineStartup {
            message: "stream dec_output has no source".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Engine failed to start: stream dec_output has no source"
        );
    }

    #[test]
    fn test_channel_closed_display() {
        let error = ExchangeError::closed("results");
        assert_eq!(error.to_string(), "Channel closed for endpoint results");
        assert!(error.is_channel_closed());
    }

    #[test]
    fn test_unknown_endpoint_display() {
        let error = ExchangeError::UnknownEndpoint {
            endpoint: "nowhere".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown endpoint: nowhere");
        assert!(!error.is_channel_closed());
    }

    #[test]
    fn test_message_error_is_transparent() {
        let error: ExchangeError = MessageError::EmptyAudio.into();
        assert_eq!(error.to_string(), MessageError::EmptyAudio.to_string());
    }

    #[test]
    fn test_request_display() {
        let error = ExchangeError::Request {
            message: "unknown message type 'video'".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Bad request: unknown message type 'video'"
        );
    }

    #[test]
    fn test_other_display() {
        let error = ExchangeError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: ExchangeError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Table>(toml_str).unwrap_err();
        let error: ExchangeError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: ExchangeError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ExchangeError>();
        assert_sync::<ExchangeError>();
    }

    #[test]
    fn test_error_debug_format() {
        let error = ExchangeError::ConfigFileNotFound {
            path: "/test/path".to_string(),
        };
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("ConfigFileNotFound"));
        assert!(debug_str.contains("/test/path"));
    }
}
