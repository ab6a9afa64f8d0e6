use clap::{Args, ValueEnum};
use serde_json::Value;

use warden_core::{Operation, Result, WardenError};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum KindArg {
    Shell,
    FileRead,
    FileWrite,
    FileDelete,
    Fetch,
    Tool,
}

/// The operation named on the command line.
#[derive(Args, Debug, Clone)]
pub(super) struct OperationArgs {
    /// Kind of operation
    #[arg(short, long, value_enum, default_value_t = KindArg::Shell)]
    kind: KindArg,

    /// Tool name, for `--kind tool`
    #[arg(long)]
    tool: Option<String>,

    /// Extra parameters as key=value (values parsed as JSON when they can be)
    #[arg(short, long, value_parser = parse_key_val)]
    param: Vec<(String, String)>,

    /// Command line, path, URL or tool description
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    text: Vec<String>,
}

/// Parse "key=value" CLI arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((k.to_string(), v.to_string()))
}

impl OperationArgs {
    pub(super) fn into_operation(self) -> Result<Operation> {
        let text = self.text.join(" ");
        let mut op = match self.kind {
            KindArg::Shell => Operation::shell(text),
            KindArg::FileRead => Operation::file_read(text),
            KindArg::FileWrite => Operation::file_write(text),
            KindArg::FileDelete => Operation::file_delete(text),
            KindArg::Fetch => Operation::network_fetch(text),
            KindArg::Tool => {
                let tool = self.tool.ok_or_else(|| {
                    WardenError::InvalidOperation("--kind tool requires --tool <NAME>".into())
                })?;
                Operation::tool_call(tool, text)
            }
        };
        for (key, raw) in self.param {
            let value = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
            op = op.with_param(key, value);
        }
        op.validate()?;
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use warden_core::OperationKind;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        op: OperationArgs,
    }

    fn op(args: &[&str]) -> Result<Operation> {
        let mut full = vec!["harness"];
        full.extend_from_slice(args);
        Harness::try_parse_from(full).unwrap().op.into_operation()
    }

    #[test]
    fn shell_is_the_default() {
        let o = op(&["git", "push", "--force"]).unwrap();
        assert_eq!(o.kind, OperationKind::Shell);
        assert_eq!(o.raw_text, "git push --force");
    }

    #[test]
    fn file_kinds_take_a_path() {
        let o = op(&["--kind", "file-delete", "notes.md"]).unwrap();
        assert!(o.is_delete());
        assert_eq!(o.target_path.as_deref(), Some("notes.md"));
    }

    #[test]
    fn params_parse_as_json() {
        let o = op(&["-p", "user_requested=true", "-p", "note=hi", "ls"]).unwrap();
        assert!(o.flag("user_requested"));
        assert_eq!(o.param_str("note"), Some("hi"));
    }

    #[test]
    fn tool_needs_a_name() {
        assert!(op(&["--kind", "tool", "drop", "table"]).is_err());
        let o = op(&["--kind", "tool", "--tool", "db.query", "select 1"]).unwrap();
        assert_eq!(o.tool_name.as_deref(), Some("db.query"));
    }

    #[test]
    fn bad_url_is_rejected() {
        assert!(matches!(
            op(&["--kind", "fetch", "nope"]).unwrap_err(),
            WardenError::InvalidOperation(_)
        ));
    }
}
