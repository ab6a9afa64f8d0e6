//! Path normalisation and classification.

/// Directories whose contents belong to the operating system.
const SYSTEM_DIRS: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/lib", "/lib64", "/boot", "/sys", "/proc", "/dev", "/var",
    "/opt", "/root", "c:/windows", "c:/program files",
];

/// Normalise a path for comparison: forward slashes, no doubled or trailing
/// separators, trailing globs dropped, relative paths joined onto `cwd`, and
/// `.` / `..` components collapsed without climbing above the root.
///
/// `~` is left unexpanded so that rules can match home-relative paths
/// without knowing whose home it is. A `..` that climbs out of `~` lands on
/// `/`, the most sensitive place it could reach.
pub fn normalize(path: &str, cwd: &str) -> String {
    let mut p = path.trim().replace('\\', "/");
    while p.contains("//") {
        p = p.replace("//", "/");
    }
    while p.len() > 1 && (p.ends_with("/*") || p.ends_with('/') || p.ends_with('*')) {
        p.pop();
    }
    if p.is_empty() {
        return collapse(&normalize_dir(cwd));
    }
    if is_absolute(&p) || p.starts_with('~') {
        return collapse(&p);
    }
    let base = normalize_dir(cwd);
    collapse(&format!("{base}/{p}"))
}

fn normalize_dir(cwd: &str) -> String {
    let mut d = cwd.trim().replace('\\', "/");
    while d.len() > 1 && d.ends_with('/') {
        d.pop();
    }
    if d.is_empty() { "/".into() } else { d }
}

/// Resolve `.` and `..` lexically. `p` is absolute, drive-rooted or `~`-rooted.
fn collapse(p: &str) -> String {
    let (mut root, rest) = if let Some(rest) = p.strip_prefix('/') {
        ("/".to_string(), rest)
    } else if p.starts_with('~') {
        let (home, rest) = p.split_once('/').unwrap_or((p, ""));
        (home.to_string(), rest)
    } else if p.len() >= 2 && p.as_bytes()[1] == b':' {
        (p[..2].to_string(), p[2..].trim_start_matches('/'))
    } else {
        (String::new(), p)
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in rest.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() && root.starts_with('~') {
                    root = "/".into();
                }
            }
            c => parts.push(c),
        }
    }

    match root.as_str() {
        "/" => format!("/{}", parts.join("/")),
        _ if parts.is_empty() => root,
        "" => parts.join("/"),
        _ => format!("{root}/{}", parts.join("/")),
    }
}

fn is_absolute(p: &str) -> bool {
    p.starts_with('/') || (p.len() >= 2 && p.as_bytes()[1] == b':' && p.as_bytes()[0].is_ascii_alphabetic())
}

/// Whether a normalised path is the filesystem root or inside a system directory.
pub fn is_system_path(normalized: &str) -> bool {
    if normalized == "/" || normalized.eq_ignore_ascii_case("c:") {
        return true;
    }
    let lower = normalized.to_ascii_lowercase();
    SYSTEM_DIRS
        .iter()
        .any(|dir| lower == *dir || lower.starts_with(&format!("{dir}/")))
}

/// Match a rule path pattern against a normalised path.
///
/// Patterns starting with `/` or a drive letter are prefixes. Patterns starting
/// with `~/` match that location under any home directory. Bare names match a
/// path component exactly. `/` alone matches only the root itself.
pub fn matches_pattern(pattern: &str, normalized: &str) -> bool {
    if pattern == "/" {
        return normalized == "/";
    }
    if let Some(rest) = pattern.strip_prefix("~/") {
        if let Some(home_rel) = normalized.strip_prefix("~/") {
            return is_prefix(rest, home_rel);
        }
        let needle = format!("/{rest}");
        return normalized.ends_with(&needle) || normalized.contains(&format!("{needle}/"));
    }
    if is_absolute(pattern) {
        return is_prefix(&pattern.to_ascii_lowercase(), &normalized.to_ascii_lowercase());
    }
    normalized.split('/').any(|component| component == pattern)
}

fn is_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Whether any component of the path marks a test tree.
pub fn is_test_path(normalized: &str) -> bool {
    normalized
        .split('/')
        .any(|c| matches!(c, "test" | "tests" | "__tests__" | "spec"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_paths() {
        assert_eq!(normalize("build", "/work/app/"), "/work/app/build");
        assert_eq!(normalize("./src/", "/work"), "/work/src");
        assert_eq!(normalize("x", "/"), "/x");
        assert_eq!(normalize(".", "/etc"), "/etc");
    }

    #[test]
    fn collapses_dot_segments() {
        assert_eq!(normalize("../../..", "/home/dev/app"), "/");
        assert_eq!(normalize("../../../etc/hosts", "/home/dev/app"), "/etc/hosts");
        assert_eq!(normalize("/home/../etc", "/"), "/etc");
        assert_eq!(normalize("/home/dev/../../etc/passwd", "/tmp"), "/etc/passwd");
        assert_eq!(normalize("../../../../../..", "/home"), "/");
        assert_eq!(normalize("./a/./b/../c", "/work"), "/work/a/c");
        assert_eq!(normalize("..", "/usr/local"), "/usr");
        assert_eq!(normalize("~/.ssh/../.aws", "/"), "~/.aws");
        assert_eq!(normalize("~/../..", "/"), "/");
        assert_eq!(normalize("C:/Windows/../Windows/System32", "/"), "C:/Windows/System32");
        assert!(is_system_path(&normalize("/home/../etc", "/")));
    }

    #[test]
    fn strips_globs_and_separators() {
        assert_eq!(normalize("/*", "/tmp"), "/");
        assert_eq!(normalize("//var//log/", "/"), "/var/log");
        assert_eq!(normalize("C:\\Windows\\System32", "/"), "C:/Windows/System32");
    }

    #[test]
    fn system_paths() {
        assert!(is_system_path("/"));
        assert!(is_system_path("/etc/hosts"));
        assert!(is_system_path("C:/Windows/System32"));
        assert!(!is_system_path("/etcetera"));
        assert!(!is_system_path("/home/alice"));
        assert!(!is_system_path("/tmp/x"));
    }

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("~/.ssh", "~/.ssh/id_rsa"));
        assert!(matches_pattern("~/.ssh", "/home/alice/.ssh/id_rsa"));
        assert!(!matches_pattern("~/.ssh", "/home/alice/.sshx"));
        assert!(matches_pattern("/etc/shadow", "/etc/shadow"));
        assert!(matches_pattern(".env", "/work/app/.env"));
        assert!(!matches_pattern(".env", "/work/app/.envrc"));
        assert!(matches_pattern("/", "/"));
        assert!(!matches_pattern("/", "/home/alice"));
    }

    #[test]
    fn test_tree_detection() {
        assert!(is_test_path("/work/app/tests"));
        assert!(is_test_path("/work/app/src/__tests__/a.js"));
        assert!(!is_test_path("/work/app/contest"));
    }
}
