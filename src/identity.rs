use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub identity_id: Option<String>,
}

impl AuthState {
    pub fn signed_in(identity_id: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            identity_id: Some(identity_id.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// The identity records are scoped to, if the session is usable.
    pub fn identity(&self) -> Option<&str> {
        match (self.is_authenticated, self.identity_id.as_deref()) {
            (true, Some(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

/// Observable holder of the current [`AuthState`].
pub struct IdentityProvider {
    tx: watch::Sender<AuthState>,
}

impl IdentityProvider {
    pub fn new(initial: AuthState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Publishes `state`; subscribers are only woken when it differs.
    pub fn set(&self, state: AuthState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    pub fn sign_in(&self, identity_id: impl Into<String>) {
        self.set(AuthState::signed_in(identity_id));
    }

    pub fn sign_out(&self) {
        self.set(AuthState::signed_out());
    }
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::new(AuthState::signed_out())
    }
}
