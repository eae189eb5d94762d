//! Client session: the cart id and preferred country persisted between runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CountryCode;
use crate::StorefrontError;

/// What the storefront remembers about the shopper. Two plain key-value entries, unversioned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    #[serde(default)]
    pub cart_id: Option<String>,
    #[serde(default)]
    pub country_code: Option<CountryCode>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SessionError> for StorefrontError {
    fn from(err: SessionError) -> Self { StorefrontError::Session(err.to_string()) }
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<ClientSession, SessionError>;
    fn save(&self, session: &ClientSession) -> Result<(), SessionError>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn load(&self) -> Result<ClientSession, SessionError> { (**self).load() }
    fn save(&self, session: &ClientSession) -> Result<(), SessionError> { (**self).save(session) }
}

/// The live session passed through the cart layer. Every change is written
/// through to the backing store before it becomes visible.
pub struct SessionContext {
    store: Box<dyn SessionStore>,
    current: Mutex<ClientSession>,
}

impl SessionContext {
    pub fn load(store: impl SessionStore + 'static) -> Result<Self, SessionError> {
        let current = store.load()?;
        Ok(Self { store: Box::new(store), current: Mutex::new(current) })
    }

    pub fn snapshot(&self) -> ClientSession { self.current.lock().clone() }
    pub fn cart_id(&self) -> Option<String> { self.current.lock().cart_id.clone() }
    pub fn country_code(&self) -> Option<CountryCode> { self.current.lock().country_code.clone() }

    pub fn set_cart_id(&self, cart_id: Option<String>) -> Result<(), SessionError> {
        self.update(|s| s.cart_id = cart_id)
    }

    pub fn set_country_code(&self, country_code: Option<CountryCode>) -> Result<(), SessionError> {
        self.update(|s| s.country_code = country_code)
    }

    fn update(&self, change: impl FnOnce(&mut ClientSession)) -> Result<(), SessionError> {
        let mut current = self.current.lock();
        let mut next = current.clone();
        change(&mut next);
        if next == *current { return Ok(()); }
        self.store.save(&next)?;
        *current = next;
        Ok(())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext").field("current", &*self.current.lock()).finish_non_exhaustive()
    }
}

/// Keeps the session in memory. Counts writes so callers can observe persistence.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<(ClientSession, usize)>,
}

impl MemorySessionStore {
    pub fn new(session: ClientSession) -> Self { Self { inner: Mutex::new((session, 0)) } }
    pub fn snapshot(&self) -> ClientSession { self.inner.lock().0.clone() }
    pub fn saves(&self) -> usize { self.inner.lock().1 }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<ClientSession, SessionError> { Ok(self.snapshot()) }

    fn save(&self, session: &ClientSession) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.0 = session.clone();
        inner.1 += 1;
        Ok(())
    }
}

/// Stores the session as a small JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
    pub fn path(&self) -> &Path { &self.path }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<ClientSession, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ClientSession::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, session: &ClientSession) -> Result<(), SessionError> {
        let body = serde_json::to_string_pretty(session)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
