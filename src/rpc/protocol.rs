//! JSON-RPC 2.0 message types.
//!
//! Requests and responses follow https://www.jsonrpc.org/specification.
//! Server-initiated notifications (`status_update`, `job_updated`) are
//! requests without an id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::DaemonEvent;
use crate::error::Error;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// None for notifications (no response expected).
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Server push message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

// Standard JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Domain error codes
pub const VALIDATION_ERROR: i32 = -32001;
pub const NOT_FOUND: i32 = -32002;
pub const CONFLICT: i32 = -32003;
pub const IO_ERROR: i32 = -32004;

pub const STATUS_UPDATE: &str = "status_update";
pub const JOB_UPDATED: &str = "job_updated";

impl Response {
    pub fn success(id: Value, result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self {
                jsonrpc: JSONRPC_VERSION.to_string(),
                result: Some(result),
                error: None,
                id,
            },
            Err(e) => Self::internal_error(id, format!("Failed to serialize result: {}", e)),
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    /// Error response for a domain error, with the code of its category.
    pub fn from_error(id: Value, error: &Error) -> Self {
        let code = match error {
            Error::Validation(_) => VALIDATION_ERROR,
            Error::NotFound(_) => NOT_FOUND,
            Error::Conflict(_) => CONFLICT,
            Error::Io { .. } => IO_ERROR,
            Error::Database(_) | Error::Archive(_) => INTERNAL_ERROR,
        };
        Self::error(id, code, error.to_string())
    }

    /// Response for a request whose id could not be read.
    pub fn parse_error() -> Self {
        Self::error(Value::Null, PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(id: Value) -> Self {
        Self::error(id, INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(id: Value, details: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, details.into())
    }

    pub fn internal_error(id: Value, details: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, details.into())
    }
}

impl Request {
    pub fn new(method: &str, params: Option<Value>, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: Some(id),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err("unsupported jsonrpc version");
        }
        if self.method.is_empty() {
            return Err("method must not be empty");
        }
        Ok(())
    }
}

impl Notification {
    pub fn from_event(event: &DaemonEvent) -> Self {
        let (method, params) = match event {
            DaemonEvent::StatusChanged(status) => {
                (STATUS_UPDATE, serde_json::to_value(status).ok())
            }
            DaemonEvent::JobUpdated => (JOB_UPDATED, None),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Status;

    #[test]
    fn test_parse_request() {
        let json = r#"{"jsonrpc":"2.0","method":"delete_job","params":{"id":"abc"},"id":1}"#;
        let req: Request = serde_json::from_str(json).unwrap();

        assert_eq!(req.method, "delete_job");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(Value::Number(1.into())));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_parse_notification() {
        let json = r#"{"jsonrpc":"2.0","method":"ping"}"#;
        let req: Request = serde_json::from_str(json).unwrap();

        assert!(req.is_notification());
        assert!(req.params.is_none());
    }

    #[test]
    fn test_domain_error_codes() {
        let cases = [
            (Error::Validation("x".into()), VALIDATION_ERROR),
            (Error::NotFound("x".into()), NOT_FOUND),
            (Error::Conflict("x".into()), CONFLICT),
            (Error::io("x", std::io::Error::other("boom")), IO_ERROR),
            (Error::Database("x".into()), INTERNAL_ERROR),
        ];
        for (error, code) in cases {
            let resp = Response::from_error(Value::Null, &error);
            assert_eq!(resp.error.unwrap().code, code);
        }
    }

    #[test]
    fn test_rejects_wrong_version() {
        let json = r#"{"jsonrpc":"1.0","method":"list_jobs","id":"a"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(req.validate().is_err());

        let resp = Response::invalid_request(req.id.unwrap());
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], INVALID_REQUEST);
        assert_eq!(value["id"], "a");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_notifications_from_events() {
        let status = Notification::from_event(&DaemonEvent::StatusChanged(Status::default()));
        assert_eq!(status.method, STATUS_UPDATE);
        assert_eq!(status.params.unwrap()["queue_size"], 0);

        let job = Notification::from_event(&DaemonEvent::JobUpdated);
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","method":"job_updated"}"#);
    }
}
