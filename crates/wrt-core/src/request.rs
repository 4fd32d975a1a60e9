//! Launch requests and launch status codes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::AppId;
use crate::error::CoreResult;

/// Argument key naming the entry point a hand-off should run.
pub const ENTRY_POINT_ARG: &str = "__entry_point__";

/// Why the caller is asking for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Launch the application.
    Start,
    /// Launch the application to open a document or URI.
    Open,
    /// Bring a launched application back to the foreground.
    Resume,
}

impl RequestKind {
    /// Wire command code of this kind.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Start => 0,
            Self::Open => 1,
            Self::Resume => 2,
        }
    }

    /// Decode a wire command code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Start),
            1 => Some(Self::Open),
            2 => Some(Self::Resume),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Open => "open",
            Self::Resume => "resume",
        })
    }
}

/// A single request to run an application.
///
/// Created per inbound packet and consumed once by dispatch, either by
/// handing it to a warm candidate or by passing it to a cold-spawned process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Application to run.
    pub app_id: AppId,
    /// Request kind.
    pub kind: RequestKind,
    /// Process that asked for the launch (0 when unknown).
    #[serde(default)]
    pub caller_pid: i32,
    /// Opaque key/value arguments forwarded to the application.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl LaunchRequest {
    /// Create a request without arguments.
    #[must_use]
    pub fn new(app_id: AppId, kind: RequestKind) -> Self {
        Self {
            app_id,
            kind,
            caller_pid: 0,
            args: BTreeMap::new(),
        }
    }

    /// Record the requesting process.
    #[must_use]
    pub fn with_caller(mut self, pid: i32) -> Self {
        self.caller_pid = pid;
        self
    }

    /// Add an argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Look up an argument.
    #[must_use]
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Entry point explicitly requested by the caller, if any.
    #[must_use]
    pub fn entry_point(&self) -> Option<&str> {
        self.arg(ENTRY_POINT_ARG).filter(|name| !name.is_empty())
    }

    /// Serialize for a hand-off or a cold spawn.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a serialized request.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid request.
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Coarse first-render status reported by a launched instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaunchStatus {
    /// No frame was rendered within the delayed window.
    Delayed,
    /// The first frame was rendered and the launch settled.
    Finished,
}

impl LaunchStatus {
    /// Wire status code: negative for `Delayed`, zero for `Finished`.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Delayed => -1,
            Self::Finished => 0,
        }
    }

    /// Decode a wire status code. Positive codes are not statuses.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            c if c < 0 => Some(Self::Delayed),
            0 => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Delayed => "delayed",
            Self::Finished => "finished",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> AppId {
        AppId::new("org.example.clock").unwrap()
    }

    #[test]
    fn test_request_kind_codes() {
        for kind in [RequestKind::Start, RequestKind::Open, RequestKind::Resume] {
            assert_eq!(RequestKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(RequestKind::from_code(7), None);
        assert_eq!(RequestKind::from_code(-1), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(LaunchStatus::from_code(-1), Some(LaunchStatus::Delayed));
        assert_eq!(LaunchStatus::from_code(-42), Some(LaunchStatus::Delayed));
        assert_eq!(LaunchStatus::from_code(0), Some(LaunchStatus::Finished));
        assert_eq!(LaunchStatus::from_code(3), None);
    }

    #[test]
    fn test_entry_point_arg() {
        let req = LaunchRequest::new(clock(), RequestKind::Start);
        assert_eq!(req.entry_point(), None);

        let req = req.with_arg(ENTRY_POINT_ARG, "widget-host");
        assert_eq!(req.entry_point(), Some("widget-host"));

        let req = req.with_arg(ENTRY_POINT_ARG, "");
        assert_eq!(req.entry_point(), None);
    }

    #[test]
    fn test_request_json_defaults() {
        let req =
            LaunchRequest::from_json(br#"{"app_id":"org.example.clock","kind":"open"}"#).unwrap();
        assert_eq!(req.kind, RequestKind::Open);
        assert_eq!(req.caller_pid, 0);
        assert!(req.args.is_empty());
    }

    #[test]
    fn test_request_json_rejects_bad_app_id() {
        assert!(LaunchRequest::from_json(br#"{"app_id":"../x","kind":"start"}"#).is_err());
    }
}
