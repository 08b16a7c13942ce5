//! Login and registration against the document store

use thiserror::Error;

use super::kv::KvError;
use super::store::{Identity, SessionStore};
use crate::remote::{DocumentStoreClient, RegisterPayload, RemoteError};

/// Shortest password the registration form accepts
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Checked locally, nothing was sent
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The store refused the request and said why
    #[error("{0}")]
    Rejected(String),

    #[error("Failed to reach the document store: {0}")]
    Remote(#[from] RemoteError),

    #[error("Session storage error: {0}")]
    Storage(#[from] KvError),
}

impl From<AuthError> for String {
    fn from(err: AuthError) -> Self {
        err.to_string()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Registration form input
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> AuthResult<RegisterPayload> {
        let email = self.email.trim();
        let first_name = self.first_name.trim();
        let last_name = self.last_name.trim();

        if email.is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
            || first_name.is_empty()
            || last_name.is_empty()
        {
            return Err(AuthError::Validation("all fields are required".to_string()));
        }
        if self.password != self.confirm_password {
            return Err(AuthError::Validation("passwords do not match".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        Ok(RegisterPayload {
            email: email.to_string(),
            password: self.password.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }
}

/// Exchange email and password for a token and persist it in `session`
pub async fn login(
    client: &DocumentStoreClient,
    session: &SessionStore,
    email: &str,
    password: &str,
) -> AuthResult<Identity> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::Validation(
            "email and password are required".to_string(),
        ));
    }

    let response = match client.login(email, password).await {
        Ok(response) => response,
        Err(RemoteError::Unauthorized(_)) => return Err(AuthError::InvalidCredentials),
        Err(RemoteError::Server { message, .. }) if !message.is_empty() => {
            return Err(AuthError::Rejected(message))
        }
        Err(e) => return Err(e.into()),
    };

    let token = response
        .data
        .and_then(|d| d.token)
        .filter(|t| !t.is_empty());

    let token = match (response.success, token) {
        (true, Some(token)) => token,
        _ => {
            log::warn!("auth: login refused for {}", email);
            return Err(match response.message {
                Some(message) if !message.is_empty() => AuthError::Rejected(message),
                _ => AuthError::InvalidCredentials,
            });
        }
    };

    let identity = Identity {
        email: email.to_string(),
        ..Default::default()
    };
    session.login(&token, identity.clone())?;

    Ok(identity)
}

/// Create an account. Does not log in.
pub async fn register(client: &DocumentStoreClient, request: &RegisterRequest) -> AuthResult<()> {
    let payload = request.validate()?;

    let response = match client.register(&payload).await {
        Ok(response) => response,
        Err(RemoteError::Server { message, .. }) if !message.is_empty() => {
            return Err(AuthError::Rejected(message))
        }
        Err(e) => return Err(e.into()),
    };

    if !response.success {
        return Err(AuthError::Rejected(
            response
                .message
                .unwrap_or_else(|| "registration failed".to_string()),
        ));
    }

    log::info!("auth: registered {}", payload.email);
    Ok(())
}
