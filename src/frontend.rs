//! Transport-agnostic HTTP front-end handler.
//!
//! Maps `POST /ep/{endpoint}/{type}` to a push of the decoded self
//! description, whose kind comes from the path, and `GET /ep/{endpoint}` to a blocking pull whose single
//! non-conversation-state message is returned as its self description. The
//! HTTP server itself lives outside this crate; it hands method, path and
//! body to [`Frontend::respond`].

use crate::error::{ExchangeError, Result};
use crate::exchange::{Block, Session};
use crate::message::{Message, MessageKind};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const ENDPOINT_PREFIX: &str = "ep";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl FromStr for Method {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(bad_request(format!("unsupported method {}", other))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FrontendResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Error response with the error text as body.
    pub fn from_error(error: &ExchangeError) -> Self {
        Self {
            status: status_for(error),
            body: error.to_string().into_bytes(),
        }
    }
}

/// HTTP status a transport should report for `error`.
pub fn status_for(error: &ExchangeError) -> u16 {
    match error {
        ExchangeError::Request { .. } | ExchangeError::Message(_) => 400,
        ExchangeError::UnknownEndpoint { .. } => 404,
        ExchangeError::ChannelClosed { .. } => 503,
        _ => 500,
    }
}

fn bad_request(message: impl Into<String>) -> ExchangeError {
    ExchangeError::Request {
        message: message.into(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Push { endpoint: &'a str, kind: &'a str },
    Pull { endpoint: &'a str },
}

fn parse_route(method: Method, path: &str) -> Result<Route<'_>> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.first() != Some(&ENDPOINT_PREFIX) {
        return Err(bad_request(format!("path {} does not start with /ep/", path)));
    }
    match (method, segments.as_slice()) {
        (Method::Post, [_, endpoint, kind]) if !endpoint.is_empty() => Ok(Route::Push {
            endpoint: *endpoint,
            kind: *kind,
        }),
        (Method::Get, [_, endpoint]) if !endpoint.is_empty() => Ok(Route::Pull {
            endpoint: *endpoint,
        }),
        (Method::Post, _) => Err(bad_request("expected POST /ep/{endpoint}/{type}")),
        (Method::Get, _) => Err(bad_request("expected GET /ep/{endpoint}")),
    }
}

pub struct Frontend {
    session: Arc<Session>,
    pull_timeout: Duration,
}

impl Frontend {
    /// GET requests wait without bound for a block.
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            pull_timeout: Duration::MAX,
        }
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Like [`Frontend::handle`], but folds errors into a status response.
    pub fn respond(&self, method: &str, path: &str, payload: &[u8]) -> FrontendResponse {
        let result = method
            .parse::<Method>()
            .and_then(|method| self.handle(method, path, payload));
        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(method = method, path = path, error = %e, "Front-end request failed");
                FrontendResponse::from_error(&e)
            }
        }
    }

    pub fn handle(&self, method: Method, path: &str, payload: &[u8]) -> Result<FrontendResponse> {
        match parse_route(method, path)? {
            Route::Push { endpoint, kind } => self.push(endpoint, kind, payload),
            Route::Pull { endpoint } => self.pull(endpoint),
        }
    }

    fn push(&self, endpoint: &str, kind: &str, payload: &[u8]) -> Result<FrontendResponse> {
        let kind: MessageKind = kind
            .parse()
            .map_err(|_| bad_request(format!("unknown message type '{}'", kind)))?;
        if !kind.is_reconstructable() {
            return Err(bad_request(format!(
                "'{}' messages cannot be pushed through the front-end",
                kind
            )));
        }
        let message = Message::from_description_as(kind, payload)?;
        self.session.push(endpoint, message)?;
        Ok(FrontendResponse::ok(Vec::new()))
    }

    fn pull(&self, endpoint: &str) -> Result<FrontendResponse> {
        let block = self
            .session
            .pull_one(endpoint, self.pull_timeout)?
            .ok_or_else(|| ExchangeError::Other(format!("no block on {} before timeout", endpoint)))?;
        let message = single_payload(&block)?;
        Ok(FrontendResponse::ok(message.describe_self()))
    }
}

/// The one message in `block` that is not a conversation-state marker.
fn single_payload(block: &Block) -> Result<&Message> {
    let mut payloads = block
        .iter()
        .map(|(_, message)| message)
        .filter(|message| message.kind() != MessageKind::ConversationState);
    match (payloads.next(), payloads.next()) {
        (Some(message), None) => Ok(message),
        (None, _) => Err(bad_request("pulled block holds no non-conversation-state message")),
        (Some(_), Some(_)) => Err(bad_request(
            "pulled block holds more than one non-conversation-state message",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::endpoint::EndpointRegistry;
    use crate::exchange::MockEngine;

    fn loopback_frontend() -> Frontend {
        let mut registry = EndpointRegistry::new();
        registry.add_push_endpoint("binary_in").unwrap();
        registry.add_pull_endpoint("binary_out", ["binary_in"]).unwrap();
        registry.add_push_endpoint("cs_in").unwrap();
        registry.add_pull_endpoint("cs_out", ["cs_in"]).unwrap();
        let session =
            Session::open_with_config(&EngineConfig::default(), registry, true).unwrap();
        Frontend::new(Arc::new(session))
    }

    #[test]
    fn test_parse_route() {
        assert_eq!(
            parse_route(Method::Post, "/ep/in/binary").unwrap(),
            Route::Push {
                endpoint: "in",
                kind: "binary"
            }
        );
        assert_eq!(
            parse_route(Method::Get, "/ep/out?x=1").unwrap(),
            Route::Pull { endpoint: "out" }
        );
        assert!(parse_route(Method::Get, "/other/out").is_err());
        assert!(parse_route(Method::Get, "/ep/out/binary").is_err());
        assert!(parse_route(Method::Post, "/ep/in").is_err());
        assert!(parse_route(Method::Get, "/ep/").is_err());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
        assert!("DELETE".parse::<Method>().is_err());
    }

    #[test]
    fn test_post_then_get_round_trip() {
        let frontend = loopback_frontend();
        let message = Message::binary("client", 12, &[1, 2, 3, 4], "myformat");

        let posted = frontend
            .handle(Method::Post, "/ep/binary_in/binary", &message.describe_self())
            .unwrap();
        assert_eq!(posted.status, 200);

        let pulled = frontend.handle(Method::Get, "/ep/binary_out", &[]).unwrap();
        assert_eq!(pulled.status, 200);
        assert_eq!(Message::from_description(&pulled.body).unwrap(), message);
    }

    #[test]
    fn test_post_rejects_type_mismatch() {
        let frontend = loopback_frontend();
        let message = Message::binary("client", 1, &[1], "f");
        let response = frontend.respond(
            "POST",
            "/ep/binary_in/conversation_state",
            &message.describe_self(),
        );
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_post_untyped_conversation_state() {
        let frontend = loopback_frontend();
        let payload = br#"{"mUtteranceId":"utt_id","mConvoId":"convo_id","mLastChunkInUtt":true,"mLastChunkInConvo":true,"time":100,"tag":"dummy","descriptors":""}"#;

        let posted = frontend.respond("POST", "/ep/cs_in/conversation_state", payload);
        assert_eq!(posted.status, 200, "{}", String::from_utf8_lossy(&posted.body));

        let block = frontend
            .session
            .pull_one("cs_out", Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(
            block.get("cs_in"),
            Some(&Message::conversation_state("dummy", 100, "utt_id", true, "convo_id", true).unwrap())
        );
    }

    #[test]
    fn test_post_rejects_unknown_type() {
        let frontend = loopback_frontend();
        let response = frontend.respond("POST", "/ep/binary_in/video", b"{}");
        assert_eq!(response.status, 400);
        assert!(String::from_utf8_lossy(&response.body).contains("video"));
    }

    #[test]
    fn test_post_rejects_bad_payload() {
        let frontend = loopback_frontend();
        let response = frontend.respond("POST", "/ep/binary_in/binary", b"not json");
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_unknown_endpoint_is_404() {
        let frontend = loopback_frontend();
        let message = Message::binary("client", 1, &[1], "f");
        let response = frontend.respond("POST", "/ep/nowhere/binary", &message.describe_self());
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_get_skips_conversation_state() {
        let mut registry = EndpointRegistry::new();
        registry
            .add_pull_endpoint("out", ["convstate_output", "dec_output"])
            .unwrap();
        let text = Message::json("dec", 5, r#"{"text": "hello"}"#).unwrap();
        let block = Block::from_messages([
            (
                "convstate_output",
                Message::conversation_state("dec", 5, "u", true, "c", false).unwrap(),
            ),
            ("dec_output", text.clone()),
        ])
        .unwrap();
        let engine = MockEngine::new("mock").with_blocks("out", vec![block]);
        let frontend = Frontend::new(Arc::new(Session::with_engine(Arc::new(engine), registry)));

        let response = frontend.handle(Method::Get, "/ep/out", &[]).unwrap();
        assert_eq!(response.body, text.describe_self());
    }

    #[test]
    fn test_get_rejects_ambiguous_block() {
        let mut registry = EndpointRegistry::new();
        registry.add_pull_endpoint("out", ["a", "b"]).unwrap();
        let block = Block::from_messages([
            ("a", Message::binary("t", 1, &[1], "f")),
            ("b", Message::binary("t", 1, &[2], "f")),
        ])
        .unwrap();
        let engine = MockEngine::new("mock").with_blocks("out", vec![block]);
        let frontend = Frontend::new(Arc::new(Session::with_engine(Arc::new(engine), registry)));

        assert!(matches!(
            frontend.handle(Method::Get, "/ep/out", &[]),
            Err(ExchangeError::Request { .. })
        ));
    }

    #[test]
    fn test_get_after_close_is_503() {
        let frontend = loopback_frontend();
        frontend.session.close().unwrap();
        let response = frontend.respond("GET", "/ep/binary_out", &[]);
        assert_eq!(response.status, 503);
    }

    #[test]
    fn test_get_timeout_is_500() {
        let frontend = loopback_frontend().with_pull_timeout(Duration::ZERO);
        let response = frontend.respond("GET", "/ep/binary_out", &[]);
        assert_eq!(response.status, 500);
    }
}
