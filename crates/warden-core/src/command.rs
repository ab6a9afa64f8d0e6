//! Shell command-line parsing shared by rule matching and recovery.

use serde::{Deserialize, Serialize};

/// Programs that wrap another command and elevate its privileges.
const ELEVATING_WRAPPERS: &[&str] = &["sudo", "doas", "pkexec", "su"];

/// Programs that wrap another command without changing what it does.
const TRANSPARENT_WRAPPERS: &[&str] = &["env", "nohup", "time", "command", "exec", "nice", "xargs"];

/// Shell operators that separate one command from the next.
const SEPARATORS: &[&str] = &["&&", "||", "|", ";"];

/// One command in a pipeline or `&&`/`;` chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSegment {
    /// Basename of the effective program, after wrappers such as `sudo` are stripped.
    pub program: String,
    /// Arguments following the program.
    pub args: Vec<String>,
    /// Whether the segment runs under a privilege-elevating wrapper.
    pub elevated: bool,
}

impl CommandSegment {
    fn from_tokens(tokens: &[String]) -> Option<Self> {
        let mut elevated = false;
        let mut idx = 0;

        while idx < tokens.len() {
            let token = tokens[idx].as_str();
            let base = basename(token);
            if ELEVATING_WRAPPERS.contains(&base) {
                elevated = true;
                idx += 1;
                // sudo -u user / doas -u user
                while idx < tokens.len() && tokens[idx].starts_with('-') {
                    let flag = tokens[idx].as_str();
                    idx += 1;
                    if matches!(flag, "-u" | "-g" | "-C" | "-h" | "-p") && idx < tokens.len() {
                        idx += 1;
                    }
                }
                continue;
            }
            if TRANSPARENT_WRAPPERS.contains(&base) {
                idx += 1;
                while idx < tokens.len() && tokens[idx].starts_with('-') {
                    idx += 1;
                }
                continue;
            }
            if is_assignment(token) {
                idx += 1;
                continue;
            }
            break;
        }

        let program = tokens.get(idx)?;
        Some(Self {
            program: basename(program).to_string(),
            args: tokens[idx + 1..].to_vec(),
            elevated,
        })
    }

    /// Check if a flag is present (handles -x, --xxx, -xyz formats).
    pub fn has_flag(&self, short: Option<char>, long: Option<&str>) -> bool {
        for arg in &self.args {
            if let Some(l) = long
                && (arg == &format!("--{l}") || arg.starts_with(&format!("--{l}=")))
            {
                return true;
            }

            if let Some(s) = short
                && arg.starts_with('-')
                && !arg.starts_with("--")
                && arg.len() > 1
                && arg[1..].contains(s)
            {
                return true;
            }
        }
        false
    }

    /// Check whether an exact argument is present.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// All non-flag arguments, in order.
    pub fn positional_args(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter(|a| !a.starts_with('-'))
            .map(String::as_str)
            .collect()
    }

    /// The first positional argument, e.g. `push` in `git push origin main`.
    pub fn subcommand(&self) -> Option<&str> {
        self.positional_args().first().copied()
    }
}

/// A parsed shell command line, split into segments on `|`, `&&`, `||` and `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub raw: String,
    pub segments: Vec<CommandSegment>,
    /// Files written through `>` or `>>` redirection.
    pub redirect_targets: Vec<String>,
}

impl CommandLine {
    /// Parse a raw shell string. Returns `None` when no program can be found.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let padded = pad_operators(trimmed);
        let tokens = match shlex::split(&padded) {
            Some(parts) if !parts.is_empty() => parts,
            // Unbalanced quotes: fall back to whitespace splitting
            _ => padded.split_whitespace().map(String::from).collect(),
        };

        let mut segments = Vec::new();
        let mut redirect_targets = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            if SEPARATORS.contains(&token.as_str()) {
                if let Some(segment) = CommandSegment::from_tokens(&current) {
                    segments.push(segment);
                }
                current.clear();
                continue;
            }
            if token == ">" || token == ">>" {
                if let Some(target) = iter.next() {
                    redirect_targets.push(target);
                }
                continue;
            }
            if let Some(target) = token.strip_prefix(">>").or_else(|| token.strip_prefix('>')) {
                if !target.is_empty() && !target.starts_with('&') {
                    redirect_targets.push(target.to_string());
                }
                continue;
            }
            current.push(token);
        }
        if let Some(segment) = CommandSegment::from_tokens(&current) {
            segments.push(segment);
        }

        if segments.is_empty() {
            return None;
        }

        Some(Self {
            raw: trimmed.to_string(),
            segments,
            redirect_targets,
        })
    }

    /// The first command in the line.
    pub fn primary(&self) -> &CommandSegment {
        // parse() never produces an empty segment list
        &self.segments[0]
    }

    /// Whether any segment runs with elevated privileges.
    pub fn is_elevated(&self) -> bool {
        self.segments.iter().any(|s| s.elevated)
    }

    /// Whether any segment runs the given program.
    pub fn runs(&self, program: &str) -> bool {
        self.segments.iter().any(|s| s.program == program)
    }

    /// Arguments and redirect targets that look like filesystem paths.
    pub fn path_arguments(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .segments
            .iter()
            .flat_map(|s| s.args.iter())
            .map(String::as_str)
            .filter(|a| looks_like_path(a))
            .collect();
        paths.extend(self.redirect_targets.iter().map(String::as_str));
        paths
    }
}

/// Whether a token looks like a filesystem path rather than a flag or word.
pub fn looks_like_path(token: &str) -> bool {
    if token.starts_with('-') || token.contains("://") {
        return false;
    }
    token == "."
        || token == ".."
        || token.starts_with('/')
        || token.starts_with('~')
        || token.starts_with("./")
        || token.starts_with("../")
        || token.contains('/')
        || token.contains('\\')
}

fn basename(token: &str) -> &str {
    token.rsplit(['/', '\\']).next().unwrap_or(token)
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Surround shell operators with spaces so that `a|b` tokenises like `a | b`.
fn pad_operators(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut chars = raw.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '|' | '&' if chars.peek() == Some(&c) => {
                    chars.next();
                    out.push(' ');
                    out.push(c);
                    out.push(c);
                    out.push(' ');
                }
                '|' | ';' => {
                    out.push(' ');
                    out.push(c);
                    out.push(' ');
                }
                _ => out.push(c),
            },
        }
    }
    out
}
