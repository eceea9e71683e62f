//! Authentication service for user management and JWT handling
//!
//! Provides:
//! - User registration and login
//! - Password hashing with bcrypt
//! - JWT access token generation and validation
//! - Signed OAuth `state` values for the Trakt connect flow

use anyhow::{Result, anyhow};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::db::sqlite_helpers::str_to_uuid;
use crate::db::{CreateUser, Database, UserRecord};

/// OAuth state tokens only need to survive the round trip through Trakt
const STATE_TOKEN_LIFETIME: i64 = 10 * 60;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    pub email: String,
    pub name: String,
    /// Token type
    pub token_type: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Claims for the OAuth `state` parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateClaims {
    sub: String,
    token_type: String,
    exp: i64,
    iat: i64,
}

// ============================================================================
// Auth Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Invalid or expired token")]
    InvalidToken,
}

/// Token returned after successful authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    /// Access token expiration in seconds
    pub expires_in: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

/// User info carried by a validated token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: AuthenticatedUser,
    pub tokens: AuthTokens,
}

// ============================================================================
// Configuration
// ============================================================================

/// Auth service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,
    /// Bcrypt cost factor (default: 12)
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            access_token_lifetime: config.access_token_lifetime,
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

// ============================================================================
// Auth Service
// ============================================================================

pub struct AuthService {
    db: Database,
    config: AuthConfig,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self { db, config }
    }

    /// Register a new user
    pub async fn register(&self, input: RegisterInput) -> Result<LoginResult> {
        let email = input.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AuthError::InvalidInput("A valid email is required").into());
        }
        if input.password.len() < 8 {
            return Err(AuthError::InvalidInput("Password must be at least 8 characters").into());
        }

        let users = self.db.users();
        if users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken.into());
        }

        let password_hash = self.hash_password(&input.password)?;

        let name = if input.name.trim().is_empty() {
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            input.name.trim().to_string()
        };

        let user = users
            .create(CreateUser {
                email,
                name,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %user.id, "Registered user");

        let tokens = self.generate_tokens(&user)?;
        Ok(LoginResult {
            user: self.user_to_authenticated(&user)?,
            tokens,
        })
    }

    /// Login with email and password
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult> {
        let user = self
            .db
            .users()
            .get_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.generate_tokens(&user)?;
        Ok(LoginResult {
            user: self.user_to_authenticated(&user)?,
            tokens,
        })
    }

    /// Validate access token and return user info
    pub fn validate_access_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let claims = self.decode_access_token(token)?;

        Ok(AuthenticatedUser {
            id: Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?,
            email: claims.email,
            name: claims.name,
        })
    }

    /// Signed, short-lived OAuth `state` carrying the user id
    pub fn issue_state_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = StateClaims {
            sub: user_id.to_string(),
            token_type: "oauth_state".to_string(),
            exp: (now + Duration::seconds(STATE_TOKEN_LIFETIME)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| anyhow!("Failed to create state token: {}", e))
    }

    /// User id from a state token issued by [`Self::issue_state_token`]
    pub fn verify_state_token(&self, state: &str) -> Result<Uuid> {
        let token_data = decode::<StateClaims>(
            state,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if token_data.claims.token_type != "oauth_state" {
            return Err(AuthError::InvalidToken.into());
        }

        Ok(Uuid::parse_str(&token_data.claims.sub).map_err(|_| AuthError::InvalidToken)?)
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Hash a password with bcrypt
    fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, self.config.bcrypt_cost).map_err(|e| anyhow!("Failed to hash password: {}", e))
    }

    /// Verify a password against a hash
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        verify(password, hash).map_err(|e| anyhow!("Failed to verify password: {}", e))
    }

    fn generate_tokens(&self, user: &UserRecord) -> Result<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.config.access_token_lifetime);

        let claims = AccessTokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            token_type: "access".to_string(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| anyhow!("Failed to create access token: {}", e))?;

        Ok(AuthTokens {
            access_token,
            expires_in: self.config.access_token_lifetime,
            token_type: "Bearer".to_string(),
        })
    }

    /// Decode and validate access token
    fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if token_data.claims.token_type != "access" {
            return Err(AuthError::InvalidToken.into());
        }

        Ok(token_data.claims)
    }

    fn user_to_authenticated(&self, user: &UserRecord) -> Result<AuthenticatedUser> {
        Ok(AuthenticatedUser {
            id: str_to_uuid(&user.id)?,
            email: user.email.clone(),
            name: user.name.clone(),
        })
    }
}
