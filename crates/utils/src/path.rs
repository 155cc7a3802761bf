use std::path::PathBuf;

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Paths without a tilde are returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }

    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_plain_path() {
        assert_eq!(expand_tilde("/tmp/foo"), PathBuf::from("/tmp/foo"));
        assert_eq!(expand_tilde("relative/foo"), PathBuf::from("relative/foo"));
    }

    #[test]
    fn test_expand_tilde_home_prefix() {
        let expanded = expand_tilde("~/sync/db.sqlite");
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.ends_with("sync/db.sqlite"));
    }
}
