// ── Hosting environment ──
//
// The page-level facts the client reacts to: where the page is served from,
// whether it is visible, and whether the network is reachable. The host
// drives an `Environment`; each client instance takes one
// `EnvironmentWatch` registration at construction and drops it on teardown.

use std::sync::Arc;

use tokio::sync::watch;
use url::Url;

use crate::error::ChannelError;

// ── PageOrigin ───────────────────────────────────────────────────────

/// Host and security context of the page embedding the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// `host[:port]`, without scheme.
    pub host: String,
    /// Page served over a secure origin.
    pub secure: bool,
}

impl PageOrigin {
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    /// Derive from a page URL: `https`/`wss` are secure, `http`/`ws` are not.
    pub fn from_url(url: &Url) -> Result<Self, ChannelError> {
        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(ChannelError::Endpoint {
                    message: format!("unsupported origin scheme '{other}'"),
                });
            }
        };

        let host = url.host_str().ok_or_else(|| ChannelError::Endpoint {
            message: format!("origin '{url}' has no host"),
        })?;

        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        Ok(Self { host, secure })
    }
}

// ── Visibility / Connectivity ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
}

/// A transition observed by an [`EnvironmentWatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentChange {
    Visibility(Visibility),
    Connectivity(Connectivity),
}

// ── Environment ──────────────────────────────────────────────────────

/// Host-side notifier. Cheaply cloneable.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

struct EnvironmentInner {
    origin: watch::Sender<PageOrigin>,
    visibility: watch::Sender<Visibility>,
    connectivity: watch::Sender<Connectivity>,
}

impl Environment {
    /// A visible, online page served from `origin`.
    pub fn new(origin: PageOrigin) -> Self {
        let (origin, _) = watch::channel(origin);
        let (visibility, _) = watch::channel(Visibility::default());
        let (connectivity, _) = watch::channel(Connectivity::default());

        Self {
            inner: Arc::new(EnvironmentInner {
                origin,
                visibility,
                connectivity,
            }),
        }
    }

    pub fn origin(&self) -> PageOrigin {
        self.inner.origin.borrow().clone()
    }

    pub fn visibility(&self) -> Visibility {
        *self.inner.visibility.borrow()
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.inner.connectivity.borrow()
    }

    /// Change the page origin. Takes effect on the next connection attempt.
    pub fn set_origin(&self, origin: PageOrigin) {
        self.inner.origin.send_if_modified(|current| set_if_changed(current, origin));
    }

    /// Report a visibility transition. Repeating the current value is a no-op.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner
            .visibility
            .send_if_modified(|current| set_if_changed(current, visibility));
    }

    /// Report a connectivity transition. Repeating the current value is a no-op.
    pub fn set_connectivity(&self, connectivity: Connectivity) {
        self.inner
            .connectivity
            .send_if_modified(|current| set_if_changed(current, connectivity));
    }

    /// Register a new listener.
    pub fn watch(&self) -> EnvironmentWatch {
        EnvironmentWatch {
            origin: self.inner.origin.subscribe(),
            visibility: self.inner.visibility.subscribe(),
            connectivity: self.inner.connectivity.subscribe(),
        }
    }

    /// Number of live [`EnvironmentWatch`] registrations.
    pub fn listener_count(&self) -> usize {
        self.inner.visibility.receiver_count()
    }
}

fn set_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

// ── EnvironmentWatch ─────────────────────────────────────────────────

/// One client's registration with an [`Environment`]. Dropping it
/// deregisters.
pub struct EnvironmentWatch {
    origin: watch::Receiver<PageOrigin>,
    visibility: watch::Receiver<Visibility>,
    connectivity: watch::Receiver<Connectivity>,
}

impl EnvironmentWatch {
    /// Live view of the page origin, re-read on every connection attempt.
    pub fn origin(&self) -> watch::Receiver<PageOrigin> {
        self.origin.clone()
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    /// Wait for the next visibility or connectivity transition.
    ///
    /// Returns `None` once the [`Environment`] has been dropped.
    pub async fn changed(&mut self) -> Option<EnvironmentChange> {
        tokio::select! {
            res = self.visibility.changed() => {
                res.ok()?;
                Some(EnvironmentChange::Visibility(*self.visibility.borrow_and_update()))
            }
            res = self.connectivity.changed() => {
                res.ok()?;
                Some(EnvironmentChange::Connectivity(*self.connectivity.borrow_and_update()))
            }
        }
    }
}
