use std::sync::Arc;

use axum::http::{header, HeaderMap};

pub const SESSION_COOKIE: &str = "regenre_session";

/// Configured API tokens. Only their blake3 hashes are kept; lookups
/// compare hashes, which blake3 does in constant time.
#[derive(Clone, Default)]
pub struct ApiTokens {
    hashes: Arc<Vec<blake3::Hash>>,
}

impl ApiTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hashes = tokens
            .into_iter()
            .map(|token| token.as_ref().trim().to_string())
            .filter(|token| !token.is_empty())
            .map(|token| blake3::hash(token.as_bytes()))
            .collect();
        Self {
            hashes: Arc::new(hashes),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.hashes.is_empty()
    }

    pub fn verify(&self, token: &str) -> bool {
        let candidate = blake3::hash(token.trim().as_bytes());
        self.hashes.iter().any(|hash| *hash == candidate)
    }
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    extract_session_cookie(headers)
}

pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    parse_cookie_value(cookie, SESSION_COOKIE)
}

fn parse_cookie_value(cookie: &str, name: &str) -> Option<String> {
    for part in cookie.split(';') {
        let mut iter = part.trim().splitn(2, '=');
        let key = iter.next()?.trim();
        let value = match iter.next() {
            Some(value) => value.trim(),
            None => continue,
        };
        if key == name && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}
