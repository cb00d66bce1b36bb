//! Sign-in, sign-up and sign-out flows plus the chat route guard.

use snafu::ensure;

use crate::error::{AuthError, AuthResult, PasswordMismatchSnafu};
use crate::gateway::{AuthSession, AuthUser, Credentials, IdentityGateway};

pub const SIGN_IN_FAILED_MESSAGE: &str =
    "Failed to sign in. Please check your credentials and try again.";
pub const SIGN_UP_FAILED_MESSAGE: &str = "Failed to create account. Please try again.";
pub const PASSWORD_MISMATCH_MESSAGE: &str = "Passwords do not match";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Chat,
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(Route),
}

/// Decides whether `route` may be shown for the user currently on the identity stream.
pub fn guard(route: Route, user: Option<&AuthUser>) -> RouteDecision {
    match (route, user) {
        (Route::Chat, None) => RouteDecision::Redirect(Route::SignIn),
        (Route::Chat, Some(_)) | (Route::SignIn | Route::SignUp, _) => RouteDecision::Allow,
    }
}

/// Outcome of a form submission that the presentation layer acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Navigate(Route),
    Stay,
}

#[derive(Debug, Clone, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    error: Option<String>,
}

impl SignInForm {
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub async fn submit(&mut self, gateway: &dyn IdentityGateway) -> FormOutcome {
        self.error = None;

        let credentials = Credentials::new(self.email.as_str(), self.password.as_str());
        match gateway.sign_in(credentials).await {
            Ok(session) => {
                log_session(gateway, "sign-in", &session);
                self.email.clear();
                self.password.clear();
                FormOutcome::Navigate(Route::Chat)
            }
            Err(error) => {
                tracing::warn!(gateway_id = gateway.id(), error = %error, "sign-in failed");
                self.error = Some(SIGN_IN_FAILED_MESSAGE.to_string());
                FormOutcome::Stay
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    error: Option<String>,
}

impl SignUpForm {
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn check_confirmation(&self) -> AuthResult<()> {
        ensure!(
            self.password == self.confirm_password,
            PasswordMismatchSnafu {
                stage: "sign-up-validate",
            }
        );
        Ok(())
    }

    /// Submits the form; a mismatched confirmation never reaches the gateway.
    pub async fn submit(&mut self, gateway: &dyn IdentityGateway) -> FormOutcome {
        if let Err(error) = self.check_confirmation() {
            self.error = Some(user_message(&error, SIGN_UP_FAILED_MESSAGE));
            return FormOutcome::Stay;
        }
        self.error = None;

        let credentials = Credentials::new(self.email.as_str(), self.password.as_str());
        match gateway.sign_up(credentials).await {
            Ok(session) => {
                log_session(gateway, "sign-up", &session);
                self.email.clear();
                self.password.clear();
                self.confirm_password.clear();
                FormOutcome::Navigate(Route::Chat)
            }
            Err(error) => {
                tracing::warn!(gateway_id = gateway.id(), error = %error, "sign-up failed");
                self.error = Some(SIGN_UP_FAILED_MESSAGE.to_string());
                FormOutcome::Stay
            }
        }
    }
}

/// Signs out and returns where the chat screen should navigate.
///
/// A failed sign-out is logged and the user stays where they are.
pub async fn sign_out(gateway: &dyn IdentityGateway) -> FormOutcome {
    match gateway.sign_out().await {
        Ok(()) => FormOutcome::Navigate(Route::SignUp),
        Err(error) => {
            tracing::error!(gateway_id = gateway.id(), error = %error, "error during logout");
            FormOutcome::Stay
        }
    }
}

fn user_message(error: &AuthError, fallback: &str) -> String {
    match error {
        AuthError::PasswordMismatch { .. } => PASSWORD_MISMATCH_MESSAGE.to_string(),
        _ => fallback.to_string(),
    }
}

fn log_session(gateway: &dyn IdentityGateway, stage: &'static str, session: &AuthSession) {
    tracing::info!(
        gateway_id = gateway.id(),
        stage,
        uid = %session.user.uid,
        expires_in_seconds = session.expires_in_seconds,
        "authenticated"
    );
}
