//! Background removal service implementations
//!
//! - Mock service (in-process, no model; tests and demos)
//! - HTTP service (remote API, enable with `http-service`)

#[cfg(feature = "http-service")]
pub mod http;
pub mod mock;

#[cfg(feature = "http-service")]
pub use self::http::HttpService;
pub use self::mock::MockService;

use crate::config::ServiceConfig;
use crate::error::{IntakeError, Result};
use crate::service::BackgroundRemovalService;
use std::sync::Arc;
use std::time::Duration;

/// Create the service described by `config`
///
/// # Errors
/// - HTTP client cannot be created
/// - HTTP service requested but the `http-service` feature is disabled
pub fn create_service(config: &ServiceConfig) -> Result<Arc<dyn BackgroundRemovalService>> {
    match config {
        ServiceConfig::Mock {
            step_delay_ms,
            fail,
        } => {
            let mut service =
                MockService::new().with_step_delay(Duration::from_millis(*step_delay_ms));
            if *fail {
                service = service.failing();
            }
            Ok(Arc::new(service))
        },
        #[cfg(feature = "http-service")]
        ServiceConfig::Http {
            endpoint,
            timeout_secs,
        } => {
            let service = HttpService::new(endpoint.clone(), Duration::from_secs(*timeout_secs))
                .map_err(|e| IntakeError::config(format!("{:#}", e)))?;
            Ok(Arc::new(service))
        },
        #[cfg(not(feature = "http-service"))]
        ServiceConfig::Http { .. } => Err(IntakeError::config(
            "HTTP service not available. Rebuild with --features http-service",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_service() {
        let service = create_service(&ServiceConfig::default()).unwrap();
        assert_eq!(service.name(), "mock");
    }

    #[cfg(feature = "http-service")]
    #[tokio::test]
    async fn test_create_http_service() {
        let service = create_service(&ServiceConfig::Http {
            endpoint: "http://127.0.0.1:9/remove".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        assert_eq!(service.name(), "http");
    }
}
