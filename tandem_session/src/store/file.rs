//! A token store backed by a local file

use std::{
    error, fs, io,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use thiserror::Error;

use super::{StoredSession, TokenStore};
use crate::{AccessToken, RefreshToken};

/// Unable to load the token file
#[derive(Debug, Error)]
#[error("unable to read token file {path}")]
pub struct StoreError {
    path: PathBuf,
    source: io::Error,
}

/// A token store that persists the session to a JSON file
///
/// Every write updates the in-process copy first and then rewrites the file,
/// so reads never wait on the disk. The new contents are written to a sibling
/// file that then replaces the old one, so the file on disk is always either
/// the previous or the new session. A failed write to disk is logged and the
/// in-process copy is kept.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    session: RwLock<StoredSession>,
}

impl FileTokenStore {
    /// Opens the token file at `path`, loading any session it holds
    ///
    /// A missing file is an empty session. So is a file that cannot be parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let session = match fs::read(&path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(session) => session,
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = (&error as &dyn error::Error),
                        "token file is not valid, starting without a session"
                    );
                    StoredSession::default()
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => StoredSession::default(),
            Err(source) => return Err(StoreError { path, source }),
        };

        Ok(Self {
            path,
            session: RwLock::new(session),
        })
    }

    /// The path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut StoredSession)) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut session);

        let result = if session.is_empty() {
            remove_file(&self.path)
        } else {
            write_file(&self.path, &session)
        };

        if let Err(error) = result {
            tracing::warn!(
                path = %self.path.display(),
                error = (&error as &dyn error::Error),
                "unable to persist session to token file"
            );
        }
    }
}

fn write_file(path: &Path, session: &StoredSession) -> io::Result<()> {
    use io::Write;

    let next_path = next_path(path);
    let mut file_opts = fs::OpenOptions::new();

    file_opts.create(true).truncate(true).write(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        file_opts.mode(0o600);
    }

    {
        let mut file = file_opts.open(&next_path)?;

        // A leftover file keeps its old mode when reopened
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        let data = serde_json::to_vec_pretty(session)?;
        file.write_all(&data)?;
        file.sync_data()?;
    }

    fs::rename(&next_path, path)
}

/// The sibling file a new session is written to before replacing `path`
fn next_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".next");
    path.with_file_name(name)
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<AccessToken> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    fn set_access_token(&self, token: AccessToken) {
        self.update(|s| s.access_token = Some(token));
    }

    fn set_refresh_token(&self, token: Option<RefreshToken>) {
        self.update(|s| s.refresh_token = token);
    }

    fn clear(&self) {
        self.update(|s| *s = StoredSession::default());
    }

    fn snapshot(&self) -> StoredSession {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn token_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("session.json")
    }

    #[test]
    fn missing_file_is_an_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(token_path(&dir)).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn session_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileTokenStore::open(token_path(&dir)).unwrap();
        store.set_access_token(AccessToken::from_static("h.p.s"));
        store.set_refresh_token(Some(RefreshToken::from_static("refresh")));
        drop(store);

        let reopened = FileTokenStore::open(token_path(&dir)).unwrap();
        assert_eq!(
            reopened.access_token(),
            Some(AccessToken::from_static("h.p.s"))
        );
        assert_eq!(
            reopened.refresh_token(),
            Some(RefreshToken::from_static("refresh"))
        );
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(token_path(&dir)).unwrap();
        store.set_access_token(AccessToken::from_static("h.p.s"));
        assert!(token_path(&dir).exists());

        store.clear();

        assert!(!token_path(&dir).exists());
        assert!(FileTokenStore::open(token_path(&dir))
            .unwrap()
            .snapshot()
            .is_empty());
    }

    #[test]
    #[traced_test]
    fn corrupt_file_is_an_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(token_path(&dir), b"{ not json").unwrap();

        let store = FileTokenStore::open(token_path(&dir)).unwrap();
        assert!(store.snapshot().is_empty());
        assert!(logs_contain("token file is not valid"));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(token_path(&dir)).unwrap();
        store.set_access_token(AccessToken::from_static("h.p.s"));

        let mode = fs::metadata(token_path(&dir)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn existing_token_file_is_made_private_on_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = token_path(&dir);
        fs::write(&path, br#"{"accessToken":"old.p.s"}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        fs::write(next_path(&path), b"").unwrap();
        fs::set_permissions(next_path(&path), fs::Permissions::from_mode(0o666)).unwrap();

        let store = FileTokenStore::open(&path).unwrap();
        store.set_access_token(AccessToken::from_static("h.p.s"));

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn write_replaces_the_file_without_leaving_a_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = token_path(&dir);
        fs::write(next_path(&path), b"{ half written").unwrap();

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.snapshot().is_empty());
        store.set_access_token(AccessToken::from_static("h.p.s"));

        assert!(!next_path(&path).exists());
        assert_eq!(
            FileTokenStore::open(&path).unwrap().access_token(),
            Some(AccessToken::from_static("h.p.s"))
        );
    }
}
