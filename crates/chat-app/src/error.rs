use aichat_identity::AuthError;
use aichat_llm::ProviderError;
use snafu::Snafu;

/// Bootstrap and terminal I/O failures. Chat and auth failures never reach this type;
/// they are shown as banners instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("missing credential: set {variable} or {prefixed}"))]
    MissingCredential {
        stage: &'static str,
        variable: &'static str,
        prefixed: &'static str,
    },
    #[snafu(display("failed to create conversation provider on `{stage}`, {source}"))]
    Provider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("failed to create identity gateway on `{stage}`, {source}"))]
    Identity {
        stage: &'static str,
        source: AuthError,
    },
    #[snafu(display("terminal i/o failed on `{stage}`, {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;
