use argon2::Config;
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::info;
use warp::{http::StatusCode, Filter};

use crate::store::Store;
use crate::types::account::{AuthToken, Login, Session};

const TOKEN_KEY_LENGTH: usize = 32;

/// Issues and checks PASETO v2 local tokens.
#[derive(Clone)]
pub struct Tokens {
    key: Vec<u8>,
    lifetime: Duration,
}

impl Tokens {
    pub fn new(key: &str, lifetime_hours: i64) -> Result<Self, handle_errors::Error> {
        if key.len() != TOKEN_KEY_LENGTH {
            return Err(handle_errors::Error::Configuration(format!(
                "token_key must be exactly {} bytes, got {}",
                TOKEN_KEY_LENGTH,
                key.len()
            )));
        }
        Ok(Tokens {
            key: key.as_bytes().to_vec(),
            lifetime: Duration::hours(lifetime_hours.max(1)),
        })
    }

    pub fn issue(&self, user_id: i32) -> Result<String, handle_errors::Error> {
        let now = Utc::now();
        let expires = now + self.lifetime;

        let token = paseto::tokens::PasetoBuilder::new()
            .set_encryption_key(&self.key)
            .set_expiration(&expires)
            .set_not_before(&now)
            .set_claim("user_id", serde_json::json!(user_id))
            .build();
        token.map_err(|e| handle_errors::Error::Configuration(format!("cannot build token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Session, handle_errors::Error> {
        let claims = paseto::tokens::validate_local_token(
            token,
            None,
            &self.key,
            &paseto::tokens::TimeBackend::Chrono,
        )
        .map_err(|_| handle_errors::Error::CannotDecryptToken)?;

        let mut session = serde_json::from_value::<Session>(claims)
            .map_err(|_| handle_errors::Error::CannotDecryptToken)?;
        session.token = token.to_string();
        Ok(session)
    }
}

pub fn hash_password(password: &[u8]) -> Result<String, handle_errors::Error> {
    let salt = rand::thread_rng().gen::<[u8; 32]>();
    let config = Config::default();
    argon2::hash_encoded(password, &salt, &config).map_err(handle_errors::Error::ArgonLibraryError)
}

pub fn verify_password(
    hash: &str,      // stored hash
    password: &[u8], // password from the request
) -> Result<bool, handle_errors::Error> {
    argon2::verify_encoded(hash, password).map_err(handle_errors::Error::ArgonLibraryError)
}

/// Accepts `Token <t>`, `Bearer <t>` or a bare token.
fn token_from_header(header: &str) -> &str {
    let header = header.trim();
    header
        .strip_prefix("Token ")
        .or_else(|| header.strip_prefix("Bearer "))
        .unwrap_or(header)
        .trim()
}

async fn authenticate(
    header: &str,
    tokens: &Tokens,
    store: &Store,
) -> Result<Session, handle_errors::Error> {
    let session = tokens.verify(token_from_header(header))?;
    if store.is_session_active(session.user_id, &session.token).await? {
        Ok(session)
    } else {
        Err(handle_errors::Error::CannotDecryptToken)
    }
}

/// Requires a valid `Authorization` header.
pub fn auth(
    tokens: Tokens,
    store: Store,
) -> impl Filter<Extract = (Session,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::any().map(move || tokens.clone()))
        .and(warp::any().map(move || store.clone()))
        .and_then(
            |header: Option<String>, tokens: Tokens, store: Store| async move {
                match header {
                    Some(header) => authenticate(&header, &tokens, &store)
                        .await
                        .map_err(warp::reject::custom),
                    None => Err(warp::reject::custom(handle_errors::Error::Unauthorized)),
                }
            },
        )
}

/// Like [`auth`], but anonymous requests pass through as `None`.
pub fn optional_auth(
    tokens: Tokens,
    store: Store,
) -> impl Filter<Extract = (Option<Session>,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::any().map(move || tokens.clone()))
        .and(warp::any().map(move || store.clone()))
        .and_then(
            |header: Option<String>, tokens: Tokens, store: Store| async move {
                match header {
                    Some(header) => authenticate(&header, &tokens, &store)
                        .await
                        .map(Some)
                        .map_err(warp::reject::custom),
                    None => Ok(None),
                }
            },
        )
}

pub async fn login(
    store: Store,
    tokens: Tokens,
    login: Login,
) -> Result<impl warp::Reply, warp::Rejection> {
    let account = match store.get_account_by_email(&login.email).await? {
        Some(account) => account,
        None => return Err(warp::reject::custom(handle_errors::Error::WrongPassword)),
    };

    if verify_password(&account.password, login.password.as_bytes())? {
        let token = tokens.issue(account.id)?;
        info!("User {} logged in", account.id);
        Ok(warp::reply::json(&AuthToken { auth_token: token }))
    } else {
        Err(warp::reject::custom(handle_errors::Error::WrongPassword))
    }
}

pub async fn logout(session: Session, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    store.revoke_token(&session.token, session.exp).await?;
    info!("User {} logged out", session.user_id);
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "RANDOM WORDS WINTER MACINTOSH PC";

    #[test]
    fn issued_token_verifies() {
        let tokens = Tokens::new(KEY, 24).unwrap();
        let token = tokens.issue(42).unwrap();
        let session = tokens.verify(&token).unwrap();
        assert_eq!(session.user_id, 42);
        assert_eq!(session.token, token);
        assert!(session.exp > Utc::now());
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let token = Tokens::new(KEY, 24).unwrap().issue(1).unwrap();
        let other = Tokens::new("ANOTHER KEY OF THIRTY-TWO BYTES!", 24).unwrap();
        assert!(matches!(
            other.verify(&token),
            Err(handle_errors::Error::CannotDecryptToken)
        ));
        assert!(matches!(
            other.verify("garbage"),
            Err(handle_errors::Error::CannotDecryptToken)
        ));
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(matches!(
            Tokens::new("short", 24),
            Err(handle_errors::Error::Configuration(_))
        ));
    }

    #[test]
    fn strips_header_schemes() {
        assert_eq!(token_from_header("Token abc"), "abc");
        assert_eq!(token_from_header("Bearer abc "), "abc");
        assert_eq!(token_from_header("abc"), "abc");
    }

    #[test]
    fn passwords_round_trip_through_argon2() {
        let hash = hash_password(b"correct horse").unwrap();
        assert!(verify_password(&hash, b"correct horse").unwrap());
        assert!(!verify_password(&hash, b"battery staple").unwrap());
    }
}
