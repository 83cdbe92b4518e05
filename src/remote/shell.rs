//! Remote shell quoting and path helpers

use std::path::PathBuf;

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Quote a remote path but leave a leading `~/` outside the quotes
/// so the remote shell still expands it.
pub fn quote_remote_path(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("~/{}", quote_path(rest)),
        None => quote_path(path),
    }
}

/// Command that removes everything inside `dir` (but not `dir` itself)
pub fn clear_dir_command(dir: &str) -> String {
    let dir = dir.trim().trim_end_matches('/');
    format!("rm -rf -- {}/*", quote_remote_path(dir))
}

/// Path as handed to SCP. SCP resolves relative paths against the login
/// directory, so `~/x` becomes `x`.
pub fn scp_path(remote: &str) -> PathBuf {
    match remote.strip_prefix("~/") {
        Some(rest) => PathBuf::from(rest),
        None => PathBuf::from(remote),
    }
}
