use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("missing API key for identity gateway '{gateway_id}'"))]
    MissingApiKey {
        stage: &'static str,
        gateway_id: String,
    },
    #[snafu(display("{field} must not be empty"))]
    EmptyField {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("Passwords do not match"))]
    PasswordMismatch { stage: &'static str },
    #[snafu(display("identity request failed on `{stage}`, {source}"))]
    Http {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("identity gateway rejected `{stage}` with status {status}: {code}"))]
    Rejected {
        stage: &'static str,
        status: u16,
        code: String,
    },
    #[snafu(display("failed to decode identity response on `{stage}`, {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
}

impl AuthError {
    /// True when the error was raised locally, before any gateway call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyField { .. } | Self::PasswordMismatch { .. }
        )
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
