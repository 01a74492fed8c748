//! Shared message schemas: the envelopes carried over the broker and the
//! JSON envelope returned to HTTP clients.
//!
//! Field names are camelCase on the wire so backend services can keep a
//! single schema regardless of implementation language.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// HTTP methods a service request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    OPTIONS,
    HEAD,
}

impl Method {
    pub fn from_http(method: &http::Method) -> Option<Self> {
        match *method {
            http::Method::GET => Some(Method::GET),
            http::Method::POST => Some(Method::POST),
            http::Method::PUT => Some(Method::PUT),
            http::Method::PATCH => Some(Method::PATCH),
            http::Method::DELETE => Some(Method::DELETE),
            http::Method::OPTIONS => Some(Method::OPTIONS),
            http::Method::HEAD => Some(Method::HEAD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::HEAD => "HEAD",
        }
    }
}

/// Authenticated identity attached to a request before publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// What the gateway publishes to a service.
///
/// Header keys are canonical lower-case; multi-valued headers are joined
/// with `", "`. Query parameters collapse to the first value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub path: String,
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
}

/// What a service publishes back to the gateway's reply queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// Machine-readable error payload inside [`ApiResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub detail: String,
}

/// The standardised JSON envelope the gateway emits to HTTP clients.
///
/// Exactly one of `data` / `error` is non-null; `status` mirrors the HTTP
/// status line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub message: String,
    pub data: Option<Value>,
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn ok(status: u16, message: impl Into<String>, data: Value) -> Self {
        Self {
            status,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            error: Some(ApiError {
                code: format!("ERR_{}", status),
                detail: detail.into(),
            }),
        }
    }
}

/// Canonical reason phrase for a status, e.g. `200 → "OK"`.
pub fn reason_phrase(status: http::StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> RequestEnvelope {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/json, text/plain".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());
        let mut query = BTreeMap::new();
        query.insert("page".to_string(), "2".to_string());
        RequestEnvelope {
            path: "/api/recipes/42".to_string(),
            method: Method::POST,
            headers,
            query_params: query,
            body: r#"{"name":"kimchi"}"#.to_string(),
            principal: Some(Principal {
                account_id: "acct-1".to_string(),
                email: Some("a@example.com".to_string()),
                name: None,
                roles: vec!["USER".to_string()],
            }),
        }
    }

    #[test]
    fn request_envelope_round_trip() {
        let env = sample_request();
        let json = serde_json::to_string(&env).unwrap();
        let back: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn request_envelope_wire_field_names() {
        let env = sample_request();
        let json: Value = serde_json::to_value(&env).unwrap();
        assert!(json.get("queryParams").is_some());
        assert!(json.get("query_params").is_none());
        assert_eq!(json["method"], "POST");
        assert_eq!(json["principal"]["accountId"], "acct-1");
    }

    #[test]
    fn response_envelope_round_trip() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let env = ResponseEnvelope {
            correlation_id: "c-1".to_string(),
            status_code: 201,
            headers,
            body: r#"{"id":7}"#.to_string(),
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: ResponseEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn response_envelope_defaults_missing_fields() {
        let back: ResponseEnvelope =
            serde_json::from_str(r#"{"correlationId":"c-2","statusCode":204}"#).unwrap();
        assert_eq!(back.correlation_id, "c-2");
        assert_eq!(back.status_code, 204);
        assert!(back.headers.is_empty());
        assert!(back.body.is_empty());
    }

    #[test]
    fn api_response_success_shape() {
        let resp = ApiResponse::ok(200, "OK", serde_json::json!({"id": 42}));
        let json: Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], 200);
        assert_eq!(json["message"], "OK");
        assert_eq!(json["data"]["id"], 42);
        assert!(json["error"].is_null());
    }

    #[test]
    fn api_response_error_shape() {
        let resp = ApiResponse::error(504, "Gateway Timeout", "upstream timeout");
        let json: Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], 504);
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["code"], "ERR_504");
        assert_eq!(json["error"]["detail"], "upstream timeout");
    }

    #[test]
    fn api_response_exactly_one_side_set() {
        let ok = ApiResponse::ok(200, "OK", Value::String(String::new()));
        assert!(ok.data.is_some() && ok.error.is_none());
        let err = ApiResponse::error(404, "Not Found", "no route matched");
        assert!(err.data.is_none() && err.error.is_some());
    }

    #[test]
    fn method_conversion() {
        assert_eq!(Method::from_http(&http::Method::GET), Some(Method::GET));
        assert_eq!(Method::from_http(&http::Method::HEAD), Some(Method::HEAD));
        assert_eq!(
            Method::from_http(&http::Method::from_bytes(b"TRACE").unwrap()),
            None
        );
        assert_eq!(Method::PATCH.as_str(), "PATCH");
    }

    #[test]
    fn reason_phrases() {
        assert_eq!(reason_phrase(http::StatusCode::OK), "OK");
        assert_eq!(
            reason_phrase(http::StatusCode::GATEWAY_TIMEOUT),
            "Gateway Timeout"
        );
    }
}
