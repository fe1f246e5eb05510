use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The badge that is logged in on this machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub badge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `$XDG_CONFIG_HOME/sentinex/session.toml`, falling back to `~/.config`.
pub fn session_path(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("sentinex")
        .join("session.toml")
}

pub fn default_session_path() -> PathBuf {
    session_path(|key| std::env::var(key).ok())
}

pub fn load(path: &Path) -> Result<Option<Session>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let session = toml::from_str(&text)
        .with_context(|| format!("corrupt session file {}", path.display()))?;
    Ok(Some(session))
}

pub fn save(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = toml::to_string(session)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Remove the session file. Returns whether one existed.
pub fn clear(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_path_prefers_xdg() {
        let path = session_path(|k| match k {
            "XDG_CONFIG_HOME" => Some("/etc/xdg".into()),
            "HOME" => Some("/home/guard".into()),
            _ => None,
        });
        assert_eq!(path, PathBuf::from("/etc/xdg/sentinex/session.toml"));

        let path = session_path(|k| (k == "HOME").then(|| "/home/guard".to_string()));
        assert_eq!(path, PathBuf::from("/home/guard/.config/sentinex/session.toml"));
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.toml");
        assert_eq!(load(&path).unwrap(), None);

        let session = Session {
            badge_id: "1042".into(),
            name: Some("J. Cruz".into()),
        };
        save(&path, &session).unwrap();
        assert_eq!(load(&path).unwrap(), Some(session));

        assert!(clear(&path).unwrap());
        assert!(!clear(&path).unwrap());
        assert_eq!(load(&path).unwrap(), None);
    }

    #[test]
    fn test_corrupt_session_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "badge_id = [").unwrap();
        assert!(load(&path).is_err());
    }
}
