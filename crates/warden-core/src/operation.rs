use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::command::CommandLine;
use crate::error::{Result, WardenError};

/// What sort of action an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Shell,
    FileRead,
    FileWrite,
    NetworkFetch,
    ToolCall,
    /// A kind the host sent that this version of Warden does not know.
    #[serde(other)]
    Unknown,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::NetworkFetch => "network_fetch",
            Self::ToolCall => "tool_call",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "shell" => Ok(Self::Shell),
            "file_read" | "read" => Ok(Self::FileRead),
            "file_write" | "write" => Ok(Self::FileWrite),
            "network_fetch" | "network" | "fetch" => Ok(Self::NetworkFetch),
            "tool_call" | "tool" => Ok(Self::ToolCall),
            other => Err(WardenError::InvalidOperation(format!(
                "unknown operation kind '{other}'"
            ))),
        }
    }
}

/// A single proposed action submitted for risk evaluation.
///
/// Operations are created by the host at invocation time and never mutated
/// afterwards; the builder methods consume and return `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// The command line, URL, or free-form description of the action.
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Host-supplied hints such as `user_requested`, `reversible`, `has_backup`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl Operation {
    pub fn new(kind: OperationKind, raw_text: impl Into<String>) -> Self {
        Self {
            kind,
            raw_text: raw_text.into(),
            target_path: None,
            tool_name: None,
            params: BTreeMap::new(),
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(OperationKind::Shell, command)
    }

    pub fn file_read(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(OperationKind::FileRead, format!("read {path}")).with_target(path)
    }

    pub fn file_write(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(OperationKind::FileWrite, format!("write {path}")).with_target(path)
    }

    pub fn file_delete(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(OperationKind::FileWrite, format!("delete {path}"))
            .with_target(path)
            .with_param("action", "delete")
    }

    pub fn network_fetch(url: impl Into<String>) -> Self {
        Self::new(OperationKind::NetworkFetch, url)
    }

    pub fn tool_call(tool: impl Into<String>, description: impl Into<String>) -> Self {
        let mut op = Self::new(OperationKind::ToolCall, description);
        op.tool_name = Some(tool.into());
        op
    }

    #[must_use]
    pub fn with_target(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Read a boolean hint; anything other than `true` counts as unset.
    pub fn flag(&self, key: &str) -> bool {
        self.params.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Read a string hint.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Parsed command line for shell operations.
    pub fn command_line(&self) -> Option<CommandLine> {
        match self.kind {
            OperationKind::Shell => CommandLine::parse(&self.raw_text),
            _ => None,
        }
    }

    /// Host part of a network fetch URL.
    pub fn url_host(&self) -> Option<String> {
        if self.kind != OperationKind::NetworkFetch {
            return None;
        }
        url::Url::parse(self.raw_text.trim())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Whether this is a file write that removes its target.
    pub fn is_delete(&self) -> bool {
        self.kind == OperationKind::FileWrite && self.param_str("action") == Some("delete")
    }

    /// Every path the operation names: the explicit target plus path-like shell arguments.
    pub fn referenced_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.target_path.iter().cloned().collect();
        if let Some(cmd) = self.command_line() {
            for p in cmd.path_arguments() {
                if !paths.iter().any(|existing| existing == p) {
                    paths.push(p.to_string());
                }
            }
        }
        paths
    }

    /// Reject malformed operations before any evaluation happens.
    pub fn validate(&self) -> Result<()> {
        if self.raw_text.trim().is_empty() {
            return Err(WardenError::InvalidOperation("raw_text is empty".into()));
        }
        match self.kind {
            OperationKind::FileRead | OperationKind::FileWrite => {
                if self.target_path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(WardenError::InvalidOperation(format!(
                        "{} operation requires target_path",
                        self.kind
                    )));
                }
            }
            OperationKind::ToolCall => {
                if self.tool_name.as_deref().is_none_or(|t| t.trim().is_empty()) {
                    return Err(WardenError::InvalidOperation(
                        "tool_call operation requires tool_name".into(),
                    ));
                }
            }
            OperationKind::NetworkFetch => {
                if url::Url::parse(self.raw_text.trim()).is_err() {
                    return Err(WardenError::InvalidOperation(format!(
                        "network_fetch target '{}' is not an absolute URL",
                        self.raw_text
                    )));
                }
            }
            OperationKind::Shell => {
                if self.command_line().is_none() {
                    return Err(WardenError::InvalidOperation(
                        "shell operation has no executable".into(),
                    ));
                }
            }
            OperationKind::Unknown => {}
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tool_name, &self.target_path) {
            (Some(tool), _) => write!(f, "{}[{}]: {}", self.kind, tool, self.raw_text),
            (None, Some(path)) if !self.raw_text.contains(path.as_str()) => {
                write!(f, "{}: {} ({})", self.kind, self.raw_text, path)
            }
            _ => write!(f, "{}: {}", self.kind, self.raw_text),
        }
    }
}
