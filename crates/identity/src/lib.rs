//! Identity Gateway boundary, Firebase adapter and the auth screen flows.

pub mod error;
pub mod firebase;
pub mod flow;
pub mod gateway;

pub use error::{AuthError, AuthResult};
pub use firebase::{
    DEFAULT_IDENTITY_ENDPOINT, FIREBASE_GATEWAY_ID, FirebaseIdentityGateway, IdentityConfig,
};
pub use flow::{
    FormOutcome, PASSWORD_MISMATCH_MESSAGE, Route, RouteDecision, SIGN_IN_FAILED_MESSAGE,
    SIGN_UP_FAILED_MESSAGE, SignInForm, SignUpForm, guard, sign_out,
};
pub use gateway::{AuthSession, AuthUser, Credentials, IdentityGateway, IdentityState};
