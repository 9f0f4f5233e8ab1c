//! Collaborators injected into effect handlers.
//!
//! Handlers never reach the outside world directly: requests go through the
//! [`Correlator`], and user-facing side effects through the [`Notifier`],
//! [`Navigator`] and [`TokenStore`] traits. Production implementations log
//! or write to disk; [`memory`] holds in-process ones for tests and demos.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use caption_client_runtime::Store;
use caption_client_transport::Correlator;

use crate::action::AppAction;
use crate::config::ClientRole;
use crate::error::TokenStoreError;
use crate::state::AppState;

/// Boxed future returned by [`TokenStore`] methods.
pub type TokenFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TokenStoreError>> + Send + 'a>>;

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Confirmation or hint
    Info,
    /// Something failed
    Error,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity
    pub kind: NotificationKind,
    /// Text shown to the user
    pub message: String,
}

impl Notification {
    /// Informational notification
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
        }
    }

    /// Error notification
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

/// Shows messages to the user (a snackbar in a GUI).
pub trait Notifier: Send + Sync {
    /// Show `notification`
    fn notify(&self, notification: Notification);
}

/// Moves the user between screens.
pub trait Navigator: Send + Sync {
    /// Go to `path`
    fn navigate(&self, path: &str);

    /// Path currently shown
    fn current_path(&self) -> String;
}

/// Persists the login token across restarts.
pub trait TokenStore: Send + Sync {
    /// Stored token, if any
    fn load(&self) -> TokenFuture<'_, Option<String>>;

    /// Store `token`, replacing any previous one
    fn save(&self, token: &str) -> TokenFuture<'_, ()>;

    /// Forget the stored token
    fn clear(&self) -> TokenFuture<'_, ()>;
}

/// Everything effect handlers need.
#[derive(Clone)]
pub struct AppEnvironment {
    /// Backend requests
    pub correlator: Arc<Correlator>,
    /// User notifications
    pub notifier: Arc<dyn Notifier>,
    /// Screen changes
    pub navigator: Arc<dyn Navigator>,
    /// Token persistence
    pub tokens: Arc<dyn TokenStore>,
    /// Which screens and data this client loads
    pub role: ClientRole,
}

impl std::fmt::Debug for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppEnvironment")
            .field("correlator", &self.correlator)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// The store type of the caption client.
pub type AppStore = Store<AppState, AppAction, AppEnvironment>;

// ============================================================================
// Production collaborators
// ============================================================================

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Info => tracing::info!(message = %notification.message, "Notification"),
            NotificationKind::Error => tracing::warn!(message = %notification.message, "Notification"),
        }
    }
}

/// Tracks the current path and logs every redirect.
#[derive(Debug, Default)]
pub struct LogNavigator {
    current: std::sync::Mutex<String>,
}

impl LogNavigator {
    /// Start at `path`
    #[must_use]
    pub fn starting_at(path: impl Into<String>) -> Self {
        Self {
            current: std::sync::Mutex::new(path.into()),
        }
    }
}

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        tracing::info!(path, "Navigate");
        *self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = path.to_string();
    }

    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Keeps the token in a plain file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the token at `path`; parent directories are created on save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File holding the token.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> TokenFuture<'_, Option<String>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(&self.path).await {
                Ok(contents) => {
                    let token = contents.trim();
                    Ok((!token.is_empty()).then(|| token.to_string()))
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn save(&self, token: &str) -> TokenFuture<'_, ()> {
        let token = token.to_string();
        Box::pin(async move {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, token).await?;
            Ok(())
        })
    }

    fn clear(&self) -> TokenFuture<'_, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
        })
    }
}

/// In-process collaborators that remember what they were asked to do.
pub mod memory {
    use std::sync::{Mutex, PoisonError};

    use super::{Navigator, Notification, Notifier, TokenFuture, TokenStore};

    /// Token store backed by a mutex.
    #[derive(Debug, Default)]
    pub struct MemoryTokenStore {
        token: Mutex<Option<String>>,
        saves: Mutex<Vec<String>>,
        clears: Mutex<usize>,
    }

    impl MemoryTokenStore {
        /// A store already holding `token`
        #[must_use]
        pub fn with_token(token: impl Into<String>) -> Self {
            Self {
                token: Mutex::new(Some(token.into())),
                ..Self::default()
            }
        }

        /// Currently stored token
        #[must_use]
        pub fn token(&self) -> Option<String> {
            self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Every token saved, in order
        #[must_use]
        pub fn saves(&self) -> Vec<String> {
            self.saves.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Number of `clear` calls
        #[must_use]
        pub fn clear_count(&self) -> usize {
            *self.clears.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl TokenStore for MemoryTokenStore {
        fn load(&self) -> TokenFuture<'_, Option<String>> {
            let token = self.token();
            Box::pin(async move { Ok(token) })
        }

        fn save(&self, token: &str) -> TokenFuture<'_, ()> {
            *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
            self.saves
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(token.to_string());
            Box::pin(async { Ok(()) })
        }

        fn clear(&self) -> TokenFuture<'_, ()> {
            *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
            *self.clears.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            Box::pin(async { Ok(()) })
        }
    }

    /// Notifier that records every notification.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        seen: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        /// Notifications so far, oldest first
        #[must_use]
        pub fn notifications(&self) -> Vec<Notification> {
            self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Messages so far, oldest first
        #[must_use]
        pub fn messages(&self) -> Vec<String> {
            self.notifications().into_iter().map(|n| n.message).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(notification);
        }
    }

    /// Navigator that records every redirect.
    #[derive(Debug)]
    pub struct RecordingNavigator {
        history: Mutex<Vec<String>>,
        current: Mutex<String>,
    }

    impl Default for RecordingNavigator {
        fn default() -> Self {
            Self::starting_at("/login")
        }
    }

    impl RecordingNavigator {
        /// Start at `path` (not recorded as a redirect)
        #[must_use]
        pub fn starting_at(path: impl Into<String>) -> Self {
            Self {
                history: Mutex::new(Vec::new()),
                current: Mutex::new(path.into()),
            }
        }

        /// Redirects so far, oldest first
        #[must_use]
        pub fn history(&self) -> Vec<String> {
            self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path.to_string());
            *self.current.lock().unwrap_or_else(PoisonError::into_inner) = path.to_string();
        }

        fn current_path(&self) -> String {
            self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }
}
