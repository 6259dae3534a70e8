use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No pages configured")]
    NoPagesConfigured,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Selector not visible after {1:?}: {0}")]
    SelectorTimeout(String, Duration),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl AuditError {
    /// Message recorded on a `PageResult` when this error ends a job step.
    pub fn finding(&self) -> String {
        match self {
            AuditError::NavigationTimeout(_) => "Timeout exceeded".to_string(),
            AuditError::Navigation(message) | AuditError::Browser(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Errors that end the whole run rather than a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::Configuration(_)
                | AuditError::NoPagesConfigured
                | AuditError::InvalidUrl(_)
                | AuditError::BrowserLaunchFailed(_)
                | AuditError::Scheduler(_)
        )
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for AuditError {
    fn from(err: image::ImageError) -> Self {
        AuditError::Image(err.to_string())
    }
}

impl From<JoinError> for AuditError {
    fn from(err: JoinError) -> Self {
        AuditError::Scheduler(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_findings() {
        assert_eq!(
            AuditError::NavigationTimeout(Duration::from_secs(30)).finding(),
            "Timeout exceeded"
        );
        assert_eq!(
            AuditError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string()).finding(),
            "net::ERR_NAME_NOT_RESOLVED"
        );
        assert_eq!(
            AuditError::Capture("disk full".to_string()).finding(),
            "Screenshot capture failed: disk full"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(AuditError::NoPagesConfigured.is_fatal());
        assert!(AuditError::Configuration("bad".to_string()).is_fatal());
        assert!(AuditError::BrowserLaunchFailed("no chrome".to_string()).is_fatal());
        assert!(!AuditError::Navigation("x".to_string()).is_fatal());
        assert!(!AuditError::Capture("x".to_string()).is_fatal());
    }
}
