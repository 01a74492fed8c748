use http::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    BadRequest(String),
    Unauthorized,
    NoRouteMatch,
    PayloadTooLarge,
    UpstreamTimeout,
    BrokerUnavailable(String),
    RegistryFull,
    DuplicateCorrelation(String),
    Internal(String),
}

impl GatewayError {
    /// HTTP status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NoRouteMatch => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RegistryFull => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::DuplicateCorrelation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            GatewayError::Unauthorized => write!(f, "authentication required"),
            GatewayError::NoRouteMatch => write!(f, "no route matched"),
            GatewayError::PayloadTooLarge => write!(f, "payload too large"),
            GatewayError::UpstreamTimeout => write!(f, "upstream timeout"),
            GatewayError::BrokerUnavailable(msg) => write!(f, "broker unavailable: {}", msg),
            GatewayError::RegistryFull => write!(f, "too many requests in flight"),
            GatewayError::DuplicateCorrelation(id) => {
                write!(f, "duplicate correlation id: {}", id)
            }
            GatewayError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_upstream_timeout() {
        assert_eq!(
            GatewayError::UpstreamTimeout.to_string(),
            "upstream timeout"
        );
    }

    #[test]
    fn display_no_route_match() {
        assert_eq!(GatewayError::NoRouteMatch.to_string(), "no route matched");
    }

    #[test]
    fn display_broker_unavailable() {
        assert_eq!(
            GatewayError::BrokerUnavailable("conn refused".to_string()).to_string(),
            "broker unavailable: conn refused"
        );
    }

    #[test]
    fn display_duplicate_correlation() {
        assert_eq!(
            GatewayError::DuplicateCorrelation("abc".to_string()).to_string(),
            "duplicate correlation id: abc"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::NoRouteMatch.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::PayloadTooLarge.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::UpstreamTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::BrokerUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::RegistryFull.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::DuplicateCorrelation("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
