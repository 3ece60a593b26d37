//! Explicit session store passed to the platform client at construction.
//!
//! Holds the login cookie write actions must present. Kept as an object with
//! a defined lifecycle instead of module-level state so tests and callers can
//! scope sessions independently.

use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct SessionStore {
    cookie: Mutex<Option<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: Mutex::new(Some(cookie.into())),
        }
    }

    pub fn set_cookie(&self, cookie: impl Into<String>) {
        *self.cookie.lock().expect("session lock poisoned") = Some(cookie.into());
    }

    pub fn cookie(&self) -> Option<String> {
        self.cookie.lock().expect("session lock poisoned").clone()
    }

    pub fn clear(&self) {
        *self.cookie.lock().expect("session lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lifecycle() {
        let session = SessionStore::new();
        assert_eq!(session.cookie(), None);
        session.set_cookie("auth=abc");
        assert_eq!(session.cookie().as_deref(), Some("auth=abc"));
        session.clear();
        assert_eq!(session.cookie(), None);
    }
}
