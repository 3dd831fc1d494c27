use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use crate::{
    error::AppError,
    models::user::{Claims, Role},
};

pub fn hash_password(plaintext: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(plaintext: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed_hash)
        .is_ok())
}

/// HS256 signing and verification of session tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64, email: &str, role: Role) -> Result<String, AppError> {
        self.issue_at(user_id, email, role, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: i64,
        email: &str,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let expiration = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Jwt(ErrorKind::InvalidToken.into()))?;

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: expiration.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Any failure (bad signature, expiry, malformed token) is an
    /// `InvalidToken`; there is no fallback path.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("rejected token: {}", e);
                AppError::InvalidToken
            })
    }
}
