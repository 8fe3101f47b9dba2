use serde::{Deserialize, Serialize};

/// Name reported to workers on a successful registration.
pub const MIDDLEWARE_NAME: &str = "distsort middleware";

/// The first message on a client connection is an unframed probe read: either
/// the literal ASCII string `LIST` or a single JSON object carrying an
/// `action` field. Everything else is rejected with a structured error.
#[derive(Debug, Clone, PartialEq)]
pub enum FirstMessage {
    /// literal `LIST`
    List,
    /// `{"action": "register", ...}`
    Register(RegisterRequest),
    /// `{"action": "sort"}`
    Sort,
    /// valid JSON, but an action outside the protocol
    Unknown(Option<String>),
    /// not `LIST` and not JSON
    Malformed,
}

pub fn parse_first_message(data: &[u8]) -> FirstMessage {
    if data == b"LIST" {
        return FirstMessage::List;
    }
    let raw: RawFirstMessage = match serde_json::from_slice(data) {
        Ok(raw) => raw,
        Err(_) => return FirstMessage::Malformed,
    };
    match raw.action.as_deref() {
        Some("register") => FirstMessage::Register(RegisterRequest {
            ip: raw.ip,
            port: raw.port,
            name: raw.name,
        }),
        Some("sort") => FirstMessage::Sort,
        _ => FirstMessage::Unknown(raw.action),
    }
}

/// The untyped shape of the first JSON message, before routing on `action`.
#[derive(Debug, Deserialize)]
struct RawFirstMessage {
    action: Option<String>,
    ip: Option<String>,
    port: Option<i64>,
    name: Option<String>,
}

/// All fields optional so that validation, not deserialization, decides what
/// a malformed registration looks like to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub ip: Option<String>,
    pub port: Option<i64>,
    pub name: Option<String>,
}

impl RegisterRequest {
    pub fn new(ip: &str, port: i64, name: &str) -> Self {
        Self {
            ip: Some(ip.to_string()),
            port: Some(port),
            name: Some(name.to_string()),
        }
    }

    /// Checks the registration fields, returning the validated (ip, port,
    /// name) triple or the message sent back to the worker.
    pub fn validate(&self) -> Result<(String, u16, String), String> {
        let ip = self.ip.as_deref().unwrap_or_default();
        let name = self.name.as_deref().unwrap_or_default();
        if ip.is_empty() || name.is_empty() {
            return Err("missing required fields (ip, port, name)".to_string());
        }
        match self.port {
            None => {
                Err("missing required fields (ip, port, name)".to_string())
            }
            Some(port) if (1..=i64::from(u16::MAX)).contains(&port) => {
                Ok((ip.to_string(), port as u16, name.to_string()))
            }
            Some(_) => Err("invalid port".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterReply {
    Accepted {
        status: String,
        distributed: bool,
        middleware_name: String,
    },
    Rejected {
        status: String,
        message: String,
    },
}

impl RegisterReply {
    pub fn accepted() -> Self {
        RegisterReply::Accepted {
            status: "registered".to_string(),
            distributed: true,
            middleware_name: MIDDLEWARE_NAME.to_string(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        RegisterReply::Rejected {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RegisterReply::Accepted { .. })
    }
}

/// `{"status": …, "message": …}` replies on the client handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
    pub message: String,
}

impl StatusReply {
    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            status: "ready".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// `{"error": …}`, the shape of every user-visible failure on a sort job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list() {
        assert_eq!(parse_first_message(b"LIST"), FirstMessage::List);
        // anything other than the exact literal is not a listing request
        assert_eq!(parse_first_message(b"LIST "), FirstMessage::Malformed);
        assert_eq!(parse_first_message(b"list"), FirstMessage::Malformed);
    }

    #[test]
    fn parse_register() {
        let msg = parse_first_message(
            br#"{"action":"register","ip":"10.0.0.5","port":7001,"name":"W1"}"#,
        );
        match msg {
            FirstMessage::Register(req) => {
                assert_eq!(req.ip.as_deref(), Some("10.0.0.5"));
                assert_eq!(req.port, Some(7001));
                assert_eq!(req.name.as_deref(), Some("W1"));
            }
            other => panic!("expected register, got {:?}", other),
        }
    }

    #[test]
    fn parse_sort() {
        assert_eq!(
            parse_first_message(br#"{"action":"sort"}"#),
            FirstMessage::Sort
        );
    }

    #[test]
    fn parse_unknown_action() {
        assert_eq!(
            parse_first_message(br#"{"action":"shuffle"}"#),
            FirstMessage::Unknown(Some("shuffle".to_string()))
        );
        assert_eq!(
            parse_first_message(br#"{"ip":"10.0.0.5"}"#),
            FirstMessage::Unknown(None)
        );
    }

    #[test]
    fn parse_malformed() {
        assert_eq!(parse_first_message(b"not json"), FirstMessage::Malformed);
        assert_eq!(parse_first_message(b""), FirstMessage::Malformed);
    }

    #[test]
    fn validate_accepts_full_request() {
        let req = RegisterRequest::new("10.0.0.5", 7001, "W1");
        assert_eq!(
            req.validate(),
            Ok(("10.0.0.5".to_string(), 7001, "W1".to_string()))
        );
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let req = RegisterRequest {
            ip: Some("10.0.0.5".to_string()),
            port: Some(7001),
            name: None,
        };
        assert!(req.validate().is_err());

        // an empty name counts as missing
        let req = RegisterRequest::new("10.0.0.5", 7001, "");
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_port() {
        for port in [0, -1, 70000, 65536] {
            let req = RegisterRequest::new("10.0.0.5", port, "W1");
            assert_eq!(req.validate(), Err("invalid port".to_string()));
        }
    }

    #[test]
    fn register_reply_wire_shape() {
        let accepted = serde_json::to_value(RegisterReply::accepted()).unwrap();
        assert_eq!(accepted["status"], "registered");
        assert_eq!(accepted["distributed"], true);
        assert_eq!(accepted["middleware_name"], MIDDLEWARE_NAME);

        let rejected =
            serde_json::to_value(RegisterReply::rejected("invalid port"))
                .unwrap();
        assert_eq!(rejected["status"], "error");
        assert_eq!(rejected["message"], "invalid port");
    }

    #[test]
    fn error_reply_wire_shape() {
        let reply = serde_json::to_value(ErrorReply::new("no workers")).unwrap();
        assert_eq!(reply, serde_json::json!({"error": "no workers"}));
    }
}
