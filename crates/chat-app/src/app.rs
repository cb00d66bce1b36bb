//! Line-oriented presentation layer: sign-in, sign-up and chat screens on a terminal.

use std::sync::Arc;

use aichat_identity::{
    FirebaseIdentityGateway, FormOutcome, IdentityGateway, Route, RouteDecision, SignInForm,
    SignUpForm, guard, sign_out,
};
use aichat_llm::{ConversationProvider, create_provider};
use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::chat::{Role, SessionManager, Turn, TurnStatus};
use crate::error::{
    AppResult, IdentitySnafu, MissingCredentialSnafu, ProviderSnafu, TerminalSnafu,
};
use crate::settings::{ChatSettings, SettingsStore};

pub const QUIT_COMMAND: &str = "/quit";
pub const LOGOUT_COMMAND: &str = "/logout";
pub const RETRY_COMMAND: &str = "/retry";
pub const HISTORY_COMMAND: &str = "/history";
pub const MODEL_COMMAND: &str = "/model";
pub const SIGN_UP_COMMAND: &str = "/signup";
pub const SIGN_IN_COMMAND: &str = "/signin";

pub const SETTINGS_SAVE_FAILED_MESSAGE: &str = "Failed to save settings. The model was not changed.";

/// Where a screen hands control next; `None` ends the program.
type Next = Option<Route>;

pub struct ChatApp<R, W> {
    gateway: Arc<dyn IdentityGateway>,
    provider: Arc<dyn ConversationProvider>,
    settings: Arc<SettingsStore>,
    input: R,
    output: W,
}

impl<R, W> ChatApp<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        gateway: Arc<dyn IdentityGateway>,
        provider: Arc<dyn ConversationProvider>,
        settings: Arc<SettingsStore>,
        input: R,
        output: W,
    ) -> Self {
        Self {
            gateway,
            provider,
            settings,
            input,
            output,
        }
    }

    /// Builds the production gateway and provider from resolved settings.
    pub fn from_settings(settings: Arc<SettingsStore>, input: R, output: W) -> AppResult<Self> {
        let snapshot = settings.settings();
        let provider_config = snapshot
            .to_provider_config()
            .context(MissingCredentialSnafu {
                stage: "resolve-provider-config",
                variable: "GEMINI_API_KEY",
                prefixed: "AICHAT_GEMINI_API_KEY",
            })?;
        let identity_config = snapshot
            .to_identity_config()
            .context(MissingCredentialSnafu {
                stage: "resolve-identity-config",
                variable: "FIREBASE_API_KEY",
                prefixed: "AICHAT_FIREBASE_API_KEY",
            })?;

        let provider = create_provider(provider_config).context(ProviderSnafu {
            stage: "create-provider",
        })?;
        let gateway: Arc<dyn IdentityGateway> = Arc::new(
            FirebaseIdentityGateway::new(identity_config).context(IdentitySnafu {
                stage: "create-identity-gateway",
            })?,
        );

        tracing::info!(
            provider_id = %provider.id(),
            gateway_id = %gateway.id(),
            model_id = %snapshot.model_name,
            "chat client configured"
        );
        Ok(Self::new(gateway, provider, settings, input, output))
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs screens until the user quits or input ends.
    pub async fn run(&mut self) -> AppResult<()> {
        let mut route = Route::SignIn;
        loop {
            let user = self.gateway.current_user();
            if let RouteDecision::Redirect(target) = guard(route, user.as_ref()) {
                tracing::debug!(from = ?route, to = ?target, "route guard redirect");
                route = target;
            }

            let next = match route {
                Route::SignIn => self.sign_in_screen().await?,
                Route::SignUp => self.sign_up_screen().await?,
                Route::Chat => self.chat_screen().await?,
            };
            match next {
                Some(target) => route = target,
                None => return Ok(()),
            }
        }
    }

    async fn sign_in_screen(&mut self) -> AppResult<Next> {
        self.write_line("== Sign In ==  (/signup to create an account)")
            .await?;
        let mut form = SignInForm::default();

        let Some(email) = self.prompt("Email: ").await? else {
            return Ok(None);
        };
        match email.as_str() {
            QUIT_COMMAND => return Ok(None),
            SIGN_UP_COMMAND => return Ok(Some(Route::SignUp)),
            _ => form.email = email,
        }
        let Some(password) = self.prompt("Password: ").await? else {
            return Ok(None);
        };
        form.password = password;

        match form.submit(self.gateway.as_ref()).await {
            FormOutcome::Navigate(route) => Ok(Some(route)),
            FormOutcome::Stay => {
                self.write_banner(form.error()).await?;
                Ok(Some(Route::SignIn))
            }
        }
    }

    async fn sign_up_screen(&mut self) -> AppResult<Next> {
        self.write_line("== Sign Up ==  (/signin if you already have an account)")
            .await?;
        let mut form = SignUpForm::default();

        let Some(email) = self.prompt("Email: ").await? else {
            return Ok(None);
        };
        match email.as_str() {
            QUIT_COMMAND => return Ok(None),
            SIGN_IN_COMMAND => return Ok(Some(Route::SignIn)),
            _ => form.email = email,
        }
        let Some(password) = self.prompt("Password: ").await? else {
            return Ok(None);
        };
        let Some(confirm_password) = self.prompt("Confirm Password: ").await? else {
            return Ok(None);
        };
        form.password = password;
        form.confirm_password = confirm_password;

        match form.submit(self.gateway.as_ref()).await {
            FormOutcome::Navigate(route) => Ok(Some(route)),
            FormOutcome::Stay => {
                self.write_banner(form.error()).await?;
                Ok(Some(Route::SignUp))
            }
        }
    }

    /// One chat screen activation: a fresh session that is closed on every exit path.
    async fn chat_screen(&mut self) -> AppResult<Next> {
        let config = self.settings.settings().session_config();
        let session = SessionManager::new(Arc::clone(&self.provider), config);
        let next = self.chat_loop(&session).await;
        session.close().await;
        next
    }

    async fn chat_loop(&mut self, session: &SessionManager) -> AppResult<Next> {
        self.write_line("== AI Chatbot ==  (/logout, /retry, /history, /model <id>, /quit)")
            .await?;
        if session.initialize().await.is_err() {
            self.write_banner(session.error().await.as_deref()).await?;
        }

        loop {
            let Some(line) = self.prompt("> ").await? else {
                return Ok(None);
            };

            // The identity stream stays authoritative while the screen is open.
            if self.gateway.current_user().is_none() {
                return Ok(Some(Route::SignIn));
            }

            let (command, argument) = line
                .split_once(' ')
                .map_or((line.as_str(), ""), |(head, tail)| (head, tail.trim()));
            match (command, argument) {
                (QUIT_COMMAND, _) => return Ok(None),
                (LOGOUT_COMMAND, _) => match sign_out(self.gateway.as_ref()).await {
                    FormOutcome::Navigate(route) => return Ok(Some(route)),
                    FormOutcome::Stay => continue,
                },
                (RETRY_COMMAND, _) => {
                    if session.initialize().await.is_err() {
                        self.write_banner(session.error().await.as_deref()).await?;
                    }
                }
                (HISTORY_COMMAND, _) => {
                    for turn in session.conversation().await {
                        self.write_line(&render_turn(&turn)).await?;
                    }
                }
                (MODEL_COMMAND, model_name) => self.change_model(model_name).await?,
                _ => {
                    session.set_input(line.clone()).await;
                    match session.send_input().await {
                        Ok(turn) => self.write_line(&render_turn(&turn)).await?,
                        Err(error) => {
                            tracing::debug!(error = %error, "send rejected");
                            self.write_banner(Some(error.user_message())).await?;
                        }
                    }
                }
            }
        }
    }

    async fn change_model(&mut self, model_name: &str) -> AppResult<()> {
        if model_name.is_empty() {
            let current = self.settings.settings().model_name.clone();
            return self.write_line(&format!("model: {current}")).await;
        }

        let updated = ChatSettings {
            model_name: model_name.to_string(),
            ..ChatSettings::clone(&self.settings.settings())
        };
        if let Err(error) = self.settings.update(updated) {
            tracing::warn!(
                path = ?self.settings.config_path(),
                error = %error,
                "failed to save model selection"
            );
            let message = format!("{SETTINGS_SAVE_FAILED_MESSAGE} ({error})");
            return self.write_banner(Some(&message)).await;
        }
        self.write_line(&format!(
            "model set to {model_name}; it applies from the next chat session"
        ))
        .await
    }

    async fn prompt(&mut self, label: &str) -> AppResult<Option<String>> {
        self.output
            .write_all(label.as_bytes())
            .await
            .context(TerminalSnafu {
                stage: "write-prompt",
            })?;
        self.output.flush().await.context(TerminalSnafu {
            stage: "flush-prompt",
        })?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context(TerminalSnafu { stage: "read-line" })?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).trim().to_string()))
    }

    async fn write_line(&mut self, text: &str) -> AppResult<()> {
        self.output
            .write_all(format!("{text}\n").as_bytes())
            .await
            .context(TerminalSnafu {
                stage: "write-line",
            })
    }

    async fn write_banner(&mut self, message: Option<&str>) -> AppResult<()> {
        match message {
            Some(message) => self.write_line(&format!("! {message}")).await,
            None => Ok(()),
        }
    }
}

fn render_turn(turn: &Turn) -> String {
    let speaker = match turn.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    match &turn.status {
        TurnStatus::Failed(_) => format!("{speaker}: {} (not delivered)", turn.text),
        TurnStatus::Pending => format!("{speaker}: {} (waiting)", turn.text),
        TurnStatus::Answered | TurnStatus::Complete => format!("{speaker}: {}", turn.text),
    }
}
