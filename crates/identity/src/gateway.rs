use futures::future::BoxFuture;
use snafu::ensure;
use tokio::sync::watch;

use crate::error::{AuthResult, EmptyFieldSnafu};

/// Authenticated user as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

/// Tokens issued on a successful sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user: AuthUser,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: u64,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: password.into(),
        }
    }

    pub(crate) fn validate(&self, stage: &'static str) -> AuthResult<()> {
        ensure!(
            !self.email.is_empty(),
            EmptyFieldSnafu {
                stage,
                field: "email",
            }
        );
        ensure!(
            !self.password.is_empty(),
            EmptyFieldSnafu {
                stage,
                field: "password",
            }
        );
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait IdentityGateway: Send + Sync {
    fn id(&self) -> &str;
    fn sign_in<'a>(&'a self, credentials: Credentials) -> BoxFuture<'a, AuthResult<AuthSession>>;
    fn sign_up<'a>(&'a self, credentials: Credentials) -> BoxFuture<'a, AuthResult<AuthSession>>;
    fn sign_out<'a>(&'a self) -> BoxFuture<'a, AuthResult<()>>;
    /// Stream of the current user; yields on every sign-in, sign-up and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;

    fn current_user(&self) -> Option<AuthUser> {
        let receiver = self.subscribe();
        let user = receiver.borrow().clone();
        user
    }
}

/// Publisher side of the identity stream shared by gateway implementations.
#[derive(Debug)]
pub struct IdentityState {
    current: watch::Sender<Option<AuthUser>>,
}

impl Default for IdentityState {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityState {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn publish(&self, user: Option<AuthUser>) {
        // `send_replace` keeps the value even when nobody is subscribed yet.
        self.current.send_replace(user);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }
}
