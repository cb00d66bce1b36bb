//! Email/password accounts backed by the Firebase Identity Toolkit REST API.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::sync::watch;

use crate::error::{AuthError, AuthResult, DecodeSnafu, HttpSnafu, MissingApiKeySnafu};
use crate::gateway::{AuthSession, AuthUser, Credentials, IdentityGateway, IdentityState};

pub const FIREBASE_GATEWAY_ID: &str = "firebase";
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub api_key: String,
    pub endpoint: String,
}

impl IdentityConfig {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        Self {
            api_key: api_key.into().trim().to_string(),
            endpoint: if endpoint.is_empty() {
                DEFAULT_IDENTITY_ENDPOINT.to_string()
            } else {
                endpoint
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum AccountAction {
    SignUp,
    SignIn,
}

impl AccountAction {
    fn path(self) -> &'static str {
        match self {
            Self::SignUp => "accounts:signUp",
            Self::SignIn => "accounts:signInWithPassword",
        }
    }

    fn stage(self) -> &'static str {
        match self {
            Self::SignUp => "sign-up",
            Self::SignIn => "sign-in",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct FirebaseIdentityGateway {
    client: reqwest::Client,
    config: IdentityConfig,
    state: IdentityState,
}

impl FirebaseIdentityGateway {
    pub fn new(config: IdentityConfig) -> AuthResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "firebase-gateway-new",
                gateway_id: FIREBASE_GATEWAY_ID,
            }
        );

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            state: IdentityState::new(),
        })
    }

    fn url(&self, action: AccountAction) -> String {
        format!("{}/{}", self.config.endpoint, action.path())
    }

    async fn submit(
        &self,
        action: AccountAction,
        credentials: Credentials,
    ) -> AuthResult<AuthSession> {
        let stage = action.stage();
        credentials.validate(stage)?;

        let response = self
            .client
            .post(self.url(action))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&PasswordRequest {
                email: &credentials.email,
                password: &credentials.password,
                return_secure_token: true,
            })
            .send()
            .await
            .context(HttpSnafu { stage })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu { stage })?;

        if !status.is_success() {
            let error = rejection(stage, status.as_u16(), &body);
            tracing::warn!(
                gateway_id = FIREBASE_GATEWAY_ID,
                stage,
                error = %error,
                "identity request rejected"
            );
            return Err(error);
        }

        let session = parse_session(&body, stage)?;
        tracing::info!(
            gateway_id = FIREBASE_GATEWAY_ID,
            stage,
            uid = %session.user.uid,
            "identity request succeeded"
        );
        self.state.publish(Some(session.user.clone()));
        Ok(session)
    }
}

impl IdentityGateway for FirebaseIdentityGateway {
    fn id(&self) -> &str {
        FIREBASE_GATEWAY_ID
    }

    fn sign_in<'a>(&'a self, credentials: Credentials) -> BoxFuture<'a, AuthResult<AuthSession>> {
        Box::pin(self.submit(AccountAction::SignIn, credentials))
    }

    fn sign_up<'a>(&'a self, credentials: Credentials) -> BoxFuture<'a, AuthResult<AuthSession>> {
        Box::pin(self.submit(AccountAction::SignUp, credentials))
    }

    fn sign_out<'a>(&'a self) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(async move {
            // ID tokens are stateless on the service side; forgetting them is the sign-out.
            self.state.publish(None);
            tracing::info!(gateway_id = FIREBASE_GATEWAY_ID, "signed out");
            Ok(())
        })
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}

fn parse_session(body: &str, stage: &'static str) -> AuthResult<AuthSession> {
    let parsed: PasswordResponse = serde_json::from_str(body).context(DecodeSnafu { stage })?;
    let expires_in_seconds = match parsed.expires_in.parse() {
        Ok(seconds) => seconds,
        Err(error) => {
            tracing::debug!(
                stage,
                expires_in = %parsed.expires_in,
                error = %error,
                "unreadable token lifetime, treating as unknown"
            );
            0
        }
    };

    Ok(AuthSession {
        user: AuthUser {
            uid: parsed.local_id,
            email: parsed.email,
        },
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in_seconds,
    })
}

fn rejection(stage: &'static str, status: u16, body: &str) -> AuthError {
    let code = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    AuthError::Rejected {
        stage,
        status,
        code,
    }
}
