//! Shared HTTP plumbing for the API-backed sources.

use forage_core::AppError;

pub(crate) const USER_AGENT: &str = "Forage/0.2 (Job Aggregator)";
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the shared reqwest client used by all API sources.
pub(crate) fn build_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Generic(format!("Failed to create HTTP client: {e}")))
}

/// Map a reqwest transport error onto the error taxonomy.
pub(crate) fn map_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(REQUEST_TIMEOUT_SECS)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::NetworkError(e.to_string())
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// 429 and 5xx are transient (retryable); any other failure status means
/// the request we built no longer matches what the backend expects, which
/// is a contract violation.
pub(crate) fn check_status(backend: &str, status: reqwest::StatusCode) -> Result<(), AppError> {
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 429 {
        return Err(AppError::RateLimited);
    }
    if status.is_server_error() {
        return Err(AppError::NetworkError(format!(
            "HTTP {} from {backend}",
            status.as_u16()
        )));
    }
    Err(AppError::ContractViolation {
        backend: backend.to_string(),
        detail: format!("HTTP {}", status.as_u16()),
    })
}

/// Read an id field that some APIs emit as a string and others as a number.
pub(crate) fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert!(check_status("adzuna", reqwest::StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("adzuna", reqwest::StatusCode::TOO_MANY_REQUESTS),
            Err(AppError::RateLimited)
        ));
        assert!(matches!(
            check_status("adzuna", reqwest::StatusCode::BAD_GATEWAY),
            Err(AppError::NetworkError(_))
        ));
        assert!(matches!(
            check_status("adzuna", reqwest::StatusCode::UNAUTHORIZED),
            Err(AppError::ContractViolation { .. })
        ));
    }

    #[test]
    fn ids_convert_from_strings_and_numbers() {
        assert_eq!(
            value_to_string(&serde_json::json!("abc123")),
            Some("abc123".to_string())
        );
        assert_eq!(
            value_to_string(&serde_json::json!(4242)),
            Some("4242".to_string())
        );
        assert_eq!(value_to_string(&serde_json::json!("")), None);
        assert_eq!(value_to_string(&serde_json::Value::Null), None);
    }
}
