//! Appliance API key storage.
//!
//! Keys live in a plain text file in the user's home directory, one
//! `host apikey` pair per line. The whole file is loaded on every operation
//! and rewritten in full on save.

use crate::error::{AuditError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the credential file inside the home directory
pub const KEY_FILE_NAME: &str = ".extrahop";

/// A stored host to API key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub host: String,
    pub api_key: String,
}

/// Get the default credential file path (`~/.extrahop`)
pub fn default_key_file_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(AuditError::NotConfigured("home directory"))?;
    Ok(home.join(KEY_FILE_NAME))
}

/// File-backed mapping from appliance host to API key
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at the default location in the caller's home directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::at(default_key_file_path()?))
    }

    /// Store at an explicit location
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the key stored for `host`.
    ///
    /// Hosts are matched exactly, without any case or whitespace normalisation.
    /// Returns `Ok(None)` when no key is stored; the store is never modified by a miss.
    pub fn resolve(&self, host: &str) -> Result<Option<String>> {
        let entries = self.load()?;
        let key = entries
            .into_iter()
            .find(|c| c.host == host)
            .map(|c| c.api_key);

        if key.is_some() {
            tracing::debug!("Found API key for {} in {:?}", host, self.path);
        } else {
            tracing::debug!("No API key for {} in {:?}", host, self.path);
        }
        Ok(key)
    }

    /// Insert or replace the key for `host`, rewriting the whole file.
    ///
    /// Both values must be single non-empty tokens; anything else could not be
    /// read back from the file.
    pub fn save(&self, host: &str, api_key: &str) -> Result<()> {
        validate_credential(host, api_key)?;

        let mut entries = self.load()?;
        match entries.iter_mut().find(|c| c.host == host) {
            Some(existing) => existing.api_key = api_key.to_string(),
            None => entries.push(Credential {
                host: host.to_string(),
                api_key: api_key.to_string(),
            }),
        }
        self.write_all(&entries)?;
        tracing::info!("Saved API key for {} to {:?}", host, self.path);
        Ok(())
    }

    /// All stored credentials, in file order
    pub fn entries(&self) -> Result<Vec<Credential>> {
        self.load()
    }

    fn load(&self) -> Result<Vec<Credential>> {
        self.create_if_missing()?;
        let content =
            fs::read_to_string(&self.path).map_err(|e| AuditError::store_io(&self.path, e))?;
        Ok(parse_entries(&content, &self.path))
    }

    fn create_if_missing(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| AuditError::store_io(parent, e))?;
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(&self.path)
            .map_err(|e| AuditError::store_io(&self.path, e))?;

        tracing::debug!("Created empty credential file at {:?}", self.path);
        Ok(())
    }

    /// Write to a sibling temp file, then rename over the original so readers
    /// only ever see a complete file.
    fn write_all(&self, entries: &[Credential]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| AuditError::store_io(&dir, e))?;
        let body = render_entries(entries);
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| AuditError::store_io(tmp.path(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .map_err(|e| AuditError::store_io(tmp.path(), e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| AuditError::store_io(&self.path, e.error))?;
        Ok(())
    }
}

/// Reject values the whitespace-separated file format cannot hold
fn validate_credential(host: &str, api_key: &str) -> Result<()> {
    let has_space = |v: &str| v.chars().any(char::is_whitespace);
    let reason = if host.is_empty() {
        "host is empty"
    } else if has_space(host) {
        "host contains whitespace"
    } else if api_key.is_empty() {
        "API key is empty"
    } else if has_space(api_key) {
        "API key contains whitespace"
    } else {
        return Ok(());
    };
    Err(AuditError::InvalidCredential {
        host: host.to_string(),
        reason,
    })
}

/// Parse the credential file, skipping lines that are not exactly `host key`
fn parse_entries(content: &str, path: &Path) -> Vec<Credential> {
    let mut entries: Vec<Credential> = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [host, api_key] = tokens.as_slice() else {
            tracing::warn!(
                "Skipping malformed line {} in {:?}: expected 2 fields, found {}",
                idx + 1,
                path,
                tokens.len()
            );
            continue;
        };

        // A later line for the same host wins, as with a re-save
        match entries.iter_mut().find(|c| c.host == *host) {
            Some(existing) => existing.api_key = api_key.to_string(),
            None => entries.push(Credential {
                host: host.to_string(),
                api_key: api_key.to_string(),
            }),
        }
    }
    entries
}

fn render_entries(entries: &[Credential]) -> String {
    entries
        .iter()
        .map(|c| format!("{} {}\n", c.host, c.api_key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::at(dir.path().join(KEY_FILE_NAME))
    }

    #[test]
    fn test_resolve_missing_host_creates_empty_file() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.path().exists());

        assert_eq!(store.resolve("10.0.0.1").unwrap(), None);
        assert!(store.path().exists());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "");
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_resolve() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save("eda.example.com", "abc123").unwrap();
        assert_eq!(
            store.resolve("eda.example.com").unwrap().as_deref(),
            Some("abc123")
        );
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "eda.example.com abc123\n"
        );
    }

    #[test]
    fn test_last_write_wins_and_other_hosts_untouched() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.save("10.0.0.1", "first").unwrap();
        store.save("10.0.0.2", "other").unwrap();
        store.save("10.0.0.1", "second").unwrap();

        assert_eq!(store.resolve("10.0.0.1").unwrap().as_deref(), Some("second"));
        assert_eq!(store.resolve("10.0.0.2").unwrap().as_deref(), Some("other"));
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "10.0.0.1 second\n10.0.0.2 other\n"
        );
    }

    #[test]
    fn test_host_match_is_exact() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save("EDA.example.com", "k").unwrap();

        assert_eq!(store.resolve("eda.example.com").unwrap(), None);
        assert_eq!(store.resolve("EDA.example.com").unwrap().as_deref(), Some("k"));
    }

    #[test]
    fn test_save_rejects_values_that_cannot_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save("10.0.0.2", "keep").unwrap();

        for (host, key) in [
            ("10.0.0.1", "abc def"),
            ("10.0.0.1", "abc\tdef"),
            ("10.0.0.1", ""),
            ("", "abc"),
            ("eda lab", "abc"),
        ] {
            let err = store.save(host, key).unwrap_err();
            assert!(
                matches!(err, AuditError::InvalidCredential { .. }),
                "{:?} {:?}",
                host,
                key
            );
        }

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "10.0.0.2 keep\n");
        assert_eq!(store.resolve("10.0.0.1").unwrap(), None);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "10.0.0.1 good\njust-a-host\n\n10.0.0.2 too many tokens\n10.0.0.3   spaced\n",
        )
        .unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(
            entries,
            vec![
                Credential {
                    host: "10.0.0.1".to_string(),
                    api_key: "good".to_string()
                },
                Credential {
                    host: "10.0.0.3".to_string(),
                    api_key: "spaced".to_string()
                },
            ]
        );
        assert_eq!(store.resolve("10.0.0.2").unwrap(), None);
    }

    #[test]
    fn test_save_drops_malformed_lines_on_rewrite() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "broken\n10.0.0.1 key\n").unwrap();

        store.save("10.0.0.9", "new").unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "10.0.0.1 key\n10.0.0.9 new\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save("10.0.0.1", "secret").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unreadable_path_is_store_io_error() {
        let dir = tempdir().unwrap();
        // A directory where the file should be
        let store = CredentialStore::at(dir.path());
        let err = store.resolve("10.0.0.1").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CredentialStoreIo);
    }
}
