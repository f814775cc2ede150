use thiserror::Error;

/// Main error type for meshgraph
#[derive(Error, Debug)]
pub enum MeshGraphError {
    /// Transport errors talking to the Prometheus HTTP API
    #[error("Prometheus transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend accepted the request but reported a failure
    #[error("Query failed: {0}")]
    Query(String),

    /// A query returned a value of the wrong type (e.g. scalar where a vector was needed)
    #[error("Unexpected query result type (expected vector): {0}")]
    UnexpectedResultType(String),

    /// A response was about to carry a NaN or infinite stat value
    #[error("Found {value} in {kind} [app:{app} version:{version} ns:{namespace}] for stats key [{metric}]")]
    NanDetected {
        value: f64,
        kind: &'static str,
        namespace: String,
        app: String,
        version: String,
        metric: String,
    },

    /// A request deadline elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient Result type using MeshGraphError
pub type Result<T> = std::result::Result<T, MeshGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeshGraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_nan_error_names_entity_and_metric() {
        let err = MeshGraphError::NanDetected {
            value: f64::NAN,
            kind: "node",
            namespace: "ns1".to_string(),
            app: "svcA".to_string(),
            version: "v1".to_string(),
            metric: "rps".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Found NaN in node"));
        assert!(msg.contains("app:svcA"));
        assert!(msg.contains("version:v1"));
        assert!(msg.contains("ns:ns1"));
        assert!(msg.contains("[rps]"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MeshGraphError = io_err.into();
        assert!(matches!(err, MeshGraphError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MeshGraphError = json_err.into();
        assert!(matches!(err, MeshGraphError::Json(_)));
    }
}
