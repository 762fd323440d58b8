//! Auth core (C4): registration, login, session refresh, logout, and
//! access-token verification.
//!
//! Access tokens are stateless HMAC-SHA256-signed JWTs (short-lived).
//! Refresh tokens are opaque random strings; only their SHA-256 hash is
//! stored, the same `hash_token` convention the teacher uses for service
//! tokens, generalized here to refresh tokens. Logout blacklists the
//! access token's `jti` rather than trying to revoke a stateless JWT.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto::{self, EncryptionKey, TenantKeypair};
use crate::error::AuthError;
use crate::models::{Claims, Role, Session, Tenant, TenantKey, User};
use crate::{clock, models};

/// Length in bytes of a freshly generated refresh token, before hex
/// encoding. 32 bytes satisfies the "≥32 bytes of opaque randomness"
/// requirement directly.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Auth core configuration and dependencies. Held by `AppState` and
/// passed by reference into every operation.
#[derive(Clone)]
pub struct AuthContext {
    pub jwt_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub platform_kek: EncryptionKey,
}

impl AuthContext {
    #[must_use]
    pub fn new(jwt_secret: Vec<u8>, access_ttl: Duration, refresh_ttl: Duration, platform_kek: EncryptionKey) -> Self {
        Self {
            jwt_secret,
            access_ttl,
            refresh_ttl,
            platform_kek,
        }
    }
}

/// Register a new tenant and its owning user in a single transaction:
/// creates the tenant, the user (role `owner`), a tenant keypair whose
/// private half is wrapped under the platform KEK, and mints a session.
///
/// # Errors
///
/// Returns [`AuthError::EmailInUse`] if the email is already registered,
/// or a storage/crypto error otherwise.
pub async fn register(
    pool: &PgPool,
    ctx: &AuthContext,
    tenant_name: &str,
    email: &str,
    password: &str,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(User, Tenant, Session), AuthError> {
    let password_hash = crypto::hash_password(password)?;
    let keypair = TenantKeypair::generate();
    let wrapped_private =
        crypto::encrypt(&ctx.platform_kek, &keypair.private_bytes())?;

    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>(
        r"INSERT INTO tenants (id, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(clock::new_id())
    .bind(tenant_name)
    .fetch_one(&mut *tx)
    .await?;

    let user = sqlx::query_as::<_, User>(
        r"INSERT INTO users (id, tenant_id, email, password_hash, role)
          VALUES ($1, $2, $3, $4, $5)
          RETURNING *",
    )
    .bind(clock::new_id())
    .bind(tenant.id)
    .bind(email)
    .bind(&password_hash)
    .bind(Role::Owner.to_string())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AuthError::EmailInUse
        } else {
            AuthError::Storage(e)
        }
    })?;

    sqlx::query_as::<_, TenantKey>(
        r"INSERT INTO tenant_keys (id, tenant_id, public_key, encrypted_private_key, status)
          VALUES ($1, $2, $3, $4, $5)
          RETURNING *",
    )
    .bind(clock::new_id())
    .bind(tenant.id)
    .bind(keypair.public_base64())
    .bind(BASE64.encode(&wrapped_private))
    .bind(models::KeyStatus::Active.to_string())
    .fetch_one(&mut *tx)
    .await?;

    let session = mint_session(&mut tx, ctx, &user, ip, user_agent).await?;

    tx.commit().await?;

    Ok((user, tenant, session))
}

/// Verify a password against a stored user, then mint a session.
///
/// # Errors
///
/// Returns [`AuthError::InvalidCredentials`] if the email is unknown or the
/// password does not match.
pub async fn login(
    pool: &PgPool,
    ctx: &AuthContext,
    email: &str,
    password: &str,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(User, Session), AuthError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !crypto::verify_password(password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    let mut tx = pool.begin().await?;
    let session = mint_session(&mut tx, ctx, &user, ip, user_agent).await?;
    tx.commit().await?;

    Ok((user, session))
}

/// Exchange a valid, unexpired, unrevoked refresh token for a new session.
/// The presented token is revoked (single-use) as part of the same
/// transaction that mints its replacement.
///
/// # Errors
///
/// Returns [`AuthError::InvalidRefresh`] if the token is unknown, expired,
/// or already revoked.
pub async fn refresh(
    pool: &PgPool,
    ctx: &AuthContext,
    refresh_token: &str,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Session, AuthError> {
    let token_hash = hash_token(refresh_token);

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, models::RefreshToken>(
        r"SELECT * FROM refresh_tokens WHERE token_hash = $1 FOR UPDATE",
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AuthError::InvalidRefresh)?;

    if row.revoked_at.is_some() || row.expires_at < clock::now() {
        return Err(AuthError::InvalidRefresh);
    }

    sqlx::query("UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2")
        .bind(clock::now())
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(row.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AuthError::InvalidRefresh)?;

    let session = mint_session(&mut tx, ctx, &user, ip, user_agent).await?;

    tx.commit().await?;

    Ok(session)
}

/// Log out: blacklist the access token's `jti`, and if a refresh token is
/// presented, revoke it too. Idempotent — logging out twice is a no-op the
/// second time.
///
/// # Errors
///
/// Returns an error only on storage failure; an already-blacklisted or
/// already-revoked token is not itself an error.
pub async fn logout(
    pool: &PgPool,
    ctx: &AuthContext,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<(), AuthError> {
    let claims = parse_access_token(ctx, access_token)?;

    let expires_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(clock::now);

    sqlx::query(
        r"INSERT INTO token_blacklist (jti, expires_at)
          VALUES ($1, $2)
          ON CONFLICT (jti) DO NOTHING",
    )
    .bind(&claims.jti)
    .bind(expires_at)
    .execute(pool)
    .await?;

    if let Some(token) = refresh_token {
        let token_hash = hash_token(token);
        sqlx::query(
            r"UPDATE refresh_tokens SET revoked_at = $1
              WHERE token_hash = $2 AND revoked_at IS NULL",
        )
        .bind(clock::now())
        .bind(&token_hash)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Verify and decode an access token's signature and expiry.
///
/// # Errors
///
/// Returns [`AuthError::Unauthorized`] if the token is malformed, expired,
/// or fails signature verification.
pub fn parse_access_token(ctx: &AuthContext, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(&ctx.jwt_secret),
        &validation,
    )
    .map_err(|e| AuthError::Unauthorized(e.to_string()))?;

    Ok(data.claims)
}

/// Whether a `jti` has been blacklisted. Queried live, never cached — the
/// blacklist is authoritative state and must reflect logouts from any
/// replica immediately.
///
/// # Errors
///
/// Returns an error on storage failure.
pub async fn is_blacklisted(pool: &PgPool, jti: &str) -> Result<bool, AuthError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = $1)",
    )
    .bind(jti)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Mint an access/refresh token pair for `user` and persist the refresh
/// token's hash. Runs within the caller's transaction so registration and
/// login commit the session atomically with their row changes.
async fn mint_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ctx: &AuthContext,
    user: &User,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Session, AuthError> {
    let now = clock::now();
    let access_exp = now + ctx.access_ttl;
    let jti = clock::new_id().to_string();

    let role: Role = user
        .role
        .parse()
        .map_err(|_| AuthError::Unauthorized("corrupt role on user row".to_owned()))?;

    let claims = Claims {
        user_id: user.id,
        tenant_id: user.tenant_id,
        email: user.email.clone(),
        role: role.to_string(),
        jti,
        exp: access_exp.timestamp(),
    };

    let access_token = encode(
        &Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&ctx.jwt_secret),
    )
    .map_err(|e| AuthError::Unauthorized(e.to_string()))?;

    let refresh_token = hex::encode(clock::random_bytes(REFRESH_TOKEN_BYTES));
    let token_hash = hash_token(&refresh_token);
    let refresh_exp = now + ctx.refresh_ttl;

    sqlx::query(
        r"INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, ip, user_agent)
          VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(clock::new_id())
    .bind(user.id)
    .bind(&token_hash)
    .bind(refresh_exp)
    .bind(ip)
    .bind(user_agent)
    .execute(&mut **tx)
    .await?;

    Ok(Session {
        access_token,
        refresh_token,
        expires_at: access_exp,
    })
}

/// Hash a refresh token with SHA-256 for storage/lookup — never the
/// plaintext token.
#[must_use]
fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Claims for an authenticated request whose role satisfies `RequireAdmin`
/// (`owner` or `admin`). Built the same way the teacher injects
/// `CloudIdentity` — a fallible conversion applied by the route-layer
/// extractor.
#[derive(Debug, Clone)]
pub struct AdminClaims(pub Claims);

impl TryFrom<Claims> for AdminClaims {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let role: Role = claims
            .role
            .parse()
            .map_err(|_| AuthError::Unauthorized("corrupt role claim".to_owned()))?;
        if role.is_admin() {
            Ok(Self(claims))
        } else {
            Err(AuthError::Unauthorized("admin role required".to_owned()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_ctx() -> AuthContext {
        AuthContext::new(
            b"test-secret-at-least-this-long".to_vec(),
            Duration::minutes(15),
            Duration::days(30),
            EncryptionKey::generate(),
        )
    }

    #[test]
    fn parse_access_token_round_trips_claims() {
        let ctx = test_ctx();
        let claims = Claims {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "a@example.com".to_owned(),
            role: "owner".to_owned(),
            jti: "abc".to_owned(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&ctx.jwt_secret),
        )
        .unwrap();

        let parsed = parse_access_token(&ctx, &token).unwrap();
        assert_eq!(parsed.user_id, claims.user_id);
        assert_eq!(parsed.jti, "abc");
    }

    #[test]
    fn parse_access_token_rejects_expired() {
        let ctx = test_ctx();
        let claims = Claims {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "a@example.com".to_owned(),
            role: "member".to_owned(),
            jti: "abc".to_owned(),
            exp: (Utc::now() - Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&ctx.jwt_secret),
        )
        .unwrap();

        assert!(parse_access_token(&ctx, &token).is_err());
    }

    #[test]
    fn admin_claims_accepts_owner_and_admin() {
        let owner = Claims {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "o@example.com".to_owned(),
            role: "owner".to_owned(),
            jti: "x".to_owned(),
            exp: 0,
        };
        assert!(AdminClaims::try_from(owner).is_ok());

        let member = Claims {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "m@example.com".to_owned(),
            role: "member".to_owned(),
            jti: "x".to_owned(),
            exp: 0,
        };
        assert!(AdminClaims::try_from(member).is_err());
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("xyz"));
    }
}
