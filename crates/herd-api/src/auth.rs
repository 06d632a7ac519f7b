//! Bearer-token authentication against the users table.
//!
//! Tokens are random, issued out of band, and stored only as a salted
//! SHA-256 digest; verification scans the (small) user set and compares
//! digests.

use axum::http::HeaderMap;
use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;

/// Identity attached to a request after token verification.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub name: String,
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| ApiError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("Bearer token is empty"));
    }
    Ok(token)
}

/// Resolve a bearer token to a user, or `Unauthorized`.
pub fn verify_token(conn: &Connection, token: &str) -> Result<AuthenticatedUser, ApiError> {
    let mut stmt = conn.prepare("SELECT id, name, token_salt, token_hash FROM users")?;
    let users = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (user_id, name, salt, hash) in users {
        if hash_token(&salt, token) == hash {
            return Ok(AuthenticatedUser { user_id, name });
        }
    }
    Err(ApiError::unauthorized("Unknown bearer token"))
}

/// Create a user (or rotate an existing one's token) and return the new
/// plaintext token. The plaintext is never stored.
pub fn issue_token(conn: &Connection, user_id: &str, name: &str) -> Result<String, ApiError> {
    let token = Uuid::new_v4().simple().to_string();
    let salt = Uuid::new_v4().simple().to_string();
    let hash = hash_token(&salt, &token);
    conn.execute(
        "INSERT INTO users (id, name, token_salt, token_hash, created_at_ms)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                       token_salt = excluded.token_salt,
                                       token_hash = excluded.token_hash",
        params![
            user_id,
            name,
            salt,
            hash,
            Utc::now().timestamp_millis()
        ],
    )?;
    Ok(token)
}

fn hash_token(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
