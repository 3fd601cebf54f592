// Authentication and JWT token handling

use crate::db::repositories::UserRepository;
use crate::errors::{AuthError, DatabaseError};
use crate::models::{User, UserClaims};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// JWT token service for encoding and decoding tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    expiration_hours: i64,
}

impl JwtService {
    /// Create a new JWT service with the given secret and expiration
    #[instrument(skip(secret))]
    pub fn new(secret: &str, expiration_hours: u64) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            expiration_hours: expiration_hours as i64,
        }
    }

    /// Encode user claims into a JWT token
    #[instrument(skip(self))]
    pub fn encode_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = UserClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            exp: (now + Duration::hours(self.expiration_hours)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "Failed to encode JWT token");
            AuthError::AuthenticationFailed(format!("Failed to encode token: {}", e))
        })
    }

    /// Decode and validate a JWT token
    #[instrument(skip(self, token))]
    pub fn decode_token(&self, token: &str) -> Result<UserClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data =
            decode::<UserClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                error!(error = %e, "Failed to decode JWT token");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken(format!("Token validation failed: {}", e)),
                }
            })?;

        Ok(token_data.claims)
    }
}

/// Credential validation against bcrypt-hashed passwords stored in the database
#[derive(Clone)]
pub struct AuthService {
    jwt_service: JwtService,
    users: Arc<UserRepository>,
}

impl AuthService {
    pub fn new(jwt_service: JwtService, users: UserRepository) -> Self {
        Self {
            jwt_service,
            users: Arc::new(users),
        }
    }

    /// Authenticate a user and issue a token
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<(String, User), AuthError> {
        let user = self
            .users
            .find_by_username(username)
            .await
            .map_err(|e| {
                error!(error = %e, username = %username, "Database error during login");
                AuthError::AuthenticationFailed(format!("Database error: {}", e))
            })?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_valid = bcrypt::verify(password, &user.password_hash).map_err(|e| {
            error!(error = %e, "Failed to verify password");
            AuthError::AuthenticationFailed(format!("Password verification failed: {}", e))
        })?;

        if !password_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.jwt_service.encode_token(&user)?;

        tracing::info!(user_id = %user.id, username = %user.username, "User logged in");
        Ok((token, user))
    }

    /// Create a new user with a bcrypt-hashed password
    #[instrument(skip(self, password))]
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<User, AuthError> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
            error!(error = %e, "Failed to hash password");
            AuthError::AuthenticationFailed(format!("Password hashing failed: {}", e))
        })?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role: role.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        self.users.create(&user).await.map_err(|e| {
            error!(error = %e, username = %username, "Failed to create user");
            match e {
                DatabaseError::DuplicateKey(_) => {
                    AuthError::AuthenticationFailed("Username already exists".to_string())
                }
                _ => AuthError::AuthenticationFailed(format!("Failed to create user: {}", e)),
            }
        })?;

        tracing::info!(user_id = %user.id, username = %username, "User created");
        Ok(user)
    }

    /// Validate a JWT token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<UserClaims, AuthError> {
        self.jwt_service.decode_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            role: "admin".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_jwt_round_trip() {
        let service = JwtService::new("test-secret", 24);
        let user = test_user();

        let token = service.encode_token(&user).expect("Failed to encode token");
        let claims = service.decode_token(&token).expect("Failed to decode token");

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, "admin");
        assert!(claims.is_admin());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = JwtService::new("test-secret", 1);
        let now = Utc::now();
        let claims = UserClaims {
            sub: Uuid::new_v4(),
            username: "alice".to_string(),
            role: "operator".to_string(),
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };

        let encoding_key = EncodingKey::from_secret("test-secret".as_bytes());
        let token = encode(&Header::default(), &claims, &encoding_key)
            .expect("Failed to encode token");

        let result = service.decode_token(&token);
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = JwtService::new("test-secret", 24);
        let result = service.decode_token("invalid.token.here");
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = JwtService::new("secret-a", 24);
        let other = JwtService::new("secret-b", 24);
        let token = service.encode_token(&test_user()).expect("encode");
        assert!(other.decode_token(&token).is_err());
    }
}
