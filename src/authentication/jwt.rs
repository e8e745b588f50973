use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::error::ApiError;
use crate::schema::{Id, User, UserRole};

use super::permissions::ActionType;

/// Signing key for session tokens.
#[derive(Clone)]
pub struct SessionKey {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKey {
    pub fn new(secret: &[u8], lifetime_hours: i64) -> Result<Self, ApiError> {
        let key = Hmac::new_from_slice(secret)
            .map_err(|e| ApiError::Store(format!("Invalid session secret: {e}")))?;

        Ok(Self {
            key,
            lifetime: Duration::hours(lifetime_hours),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_superuser: bool,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(user: &User, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: user.id,
            username: user.username.to_owned(),
            role: user.role.to_owned(),
            is_superuser: user.is_superuser,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_superuser: bool,
}

impl SessionData {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin || self.is_superuser
    }

    pub fn authenticate(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.authenticate(self) {
            return Err(ApiError::Forbidden(String::from(
                "You don't have permission to perform this action.",
            )));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            role: value.role,
            is_superuser: value.is_superuser,
        }
    }
}

impl From<&User> for SessionData {
    fn from(user: &User) -> Self {
        SessionData {
            user_id: user.id,
            username: user.username.to_owned(),
            role: user.role.to_owned(),
            is_superuser: user.is_superuser,
        }
    }
}

/// The actor behind a request, passed explicitly to every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Authenticated(SessionData),
}

impl Principal {
    pub fn session(&self) -> Option<&SessionData> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(session) => Some(session),
        }
    }

    pub fn user_id(&self) -> Option<Id> {
        self.session().map(|session| session.user_id)
    }

    /// Session of an authenticated principal, `Unauthenticated` otherwise.
    pub fn require(&self) -> Result<&SessionData, ApiError> {
        self.session().ok_or(ApiError::Unauthenticated)
    }
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Principal::Authenticated(SessionData::from(&user))
    }
}

pub fn generate_jwt_session(user: &User, key: &SessionKey) -> Result<String, ApiError> {
    let claims = JwtSessionData::new(user, key.lifetime);

    claims.sign_with_key(&key.key).map_err(|e| {
        log::error!("Failed to sign session for user {}: {e}", user.id);
        ApiError::Store(format!("{e}"))
    })
}

pub fn verify_jwt_session(token: &str, key: &SessionKey) -> Result<JwtSessionData, ApiError> {
    let session: JwtSessionData = token
        .verify_with_key(&key.key)
        .map_err(|_| ApiError::InvalidSession(String::from("Invalid token")))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(ApiError::InvalidSession(String::from("Token expired")));
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Ada"),
            last_name: String::from("Cook"),
            password: String::new(),
            role,
            is_superuser: false,
        }
    }

    #[test]
    fn session_round_trip() {
        let key = SessionKey::new(b"test-secret", 1).unwrap();
        let token = generate_jwt_session(&user(UserRole::Admin), &key).unwrap();

        let session: SessionData = verify_jwt_session(&token, &key).unwrap().into();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
        assert!(session.is_admin());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let key = SessionKey::new(b"test-secret", 1).unwrap();
        let other = SessionKey::new(b"another-secret", 1).unwrap();
        let token = generate_jwt_session(&user(UserRole::User), &other).unwrap();

        assert!(matches!(
            verify_jwt_session(&token, &key),
            Err(ApiError::InvalidSession(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let key = SessionKey::new(b"test-secret", -1).unwrap();
        let token = generate_jwt_session(&user(UserRole::User), &key).unwrap();

        assert!(matches!(
            verify_jwt_session(&token, &key),
            Err(ApiError::InvalidSession(info)) if info == "Token expired"
        ));
    }

    #[test]
    fn anonymous_principal_has_no_session() {
        assert!(Principal::Anonymous.require().is_err());
        assert_eq!(Principal::from(user(UserRole::User)).user_id(), Some(7));
    }
}
