//! Visitor identity carried in a cookie.
//!
//! The engine treats the visitor as an opaque token. This module is where the
//! HTTP layer finds one: an explicit value from the request wins, then the
//! cookie, and only the assign endpoint mints a fresh token when neither is
//! present.

use axum::http::{HeaderMap, HeaderValue, header};
use uuid::Uuid;

use crate::error::ApiError;

pub const DEFAULT_COOKIE_NAME: &str = "ab_uid";
pub const DEFAULT_COOKIE_DAYS: u32 = 365;

/// Cookie settings for visitor tokens.
#[derive(Debug, Clone)]
pub struct VisitorCookie {
  pub name:     String,
  /// Lifetime of an issued cookie.
  pub max_days: u32,
}

impl Default for VisitorCookie {
  fn default() -> Self {
    Self {
      name:     DEFAULT_COOKIE_NAME.to_owned(),
      max_days: DEFAULT_COOKIE_DAYS,
    }
  }
}

/// A visitor token together with whether it was minted for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
  pub token:  String,
  pub issued: bool,
}

/// A fresh random token: 32 lowercase hex characters.
pub fn issue_token() -> String { Uuid::new_v4().simple().to_string() }

impl VisitorCookie {
  /// The token from the request's `Cookie` headers, if present and non-empty.
  pub fn read(&self, headers: &HeaderMap) -> Option<String> {
    headers
      .get_all(header::COOKIE)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .flat_map(|v| v.split(';'))
      .filter_map(|pair| pair.trim().split_once('='))
      .find(|(name, value)| *name == self.name && !value.is_empty())
      .map(|(_, value)| value.to_owned())
  }

  /// Explicit token, else cookie. Never mints.
  pub fn find(&self, explicit: Option<String>, headers: &HeaderMap) -> Option<String> {
    explicit
      .filter(|v| !v.is_empty())
      .or_else(|| self.read(headers))
  }

  /// Explicit token, else cookie, else a freshly issued token.
  pub fn resolve(&self, explicit: Option<String>, headers: &HeaderMap) -> Visitor {
    match self.find(explicit, headers) {
      Some(token) => Visitor { token, issued: false },
      None => Visitor { token: issue_token(), issued: true },
    }
  }

  /// `Set-Cookie` value persisting `token` for the configured lifetime.
  pub fn set_cookie(&self, token: &str) -> Result<HeaderValue, ApiError> {
    let max_age = u64::from(self.max_days) * 24 * 60 * 60;
    HeaderValue::from_str(&format!(
      "{}={token}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax",
      self.name
    ))
    .map_err(|e| ApiError::Internal(format!("invalid visitor cookie: {e}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn headers(cookie: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
    h
  }

  #[test]
  fn issued_tokens_are_hex() {
    let token = issue_token();
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(token, issue_token());
  }

  #[test]
  fn reads_named_cookie_among_others() {
    let cookie = VisitorCookie::default();
    let h = headers("theme=dark; ab_uid=abc123; lang=en");
    assert_eq!(cookie.read(&h).as_deref(), Some("abc123"));
  }

  #[test]
  fn empty_cookie_is_ignored() {
    let cookie = VisitorCookie::default();
    assert_eq!(cookie.read(&headers("ab_uid=")), None);
    assert_eq!(cookie.read(&HeaderMap::new()), None);
  }

  #[test]
  fn explicit_token_beats_cookie() {
    let cookie = VisitorCookie::default();
    let h = headers("ab_uid=from-cookie");
    let v = cookie.resolve(Some("explicit".into()), &h);
    assert_eq!(v, Visitor { token: "explicit".into(), issued: false });

    let v = cookie.resolve(Some(String::new()), &h);
    assert_eq!(v.token, "from-cookie");
  }

  #[test]
  fn missing_visitor_is_issued() {
    let v = VisitorCookie::default().resolve(None, &HeaderMap::new());
    assert!(v.issued);
    assert_eq!(v.token.len(), 32);
  }

  #[test]
  fn set_cookie_attributes() {
    let value = VisitorCookie::default().set_cookie("tok").unwrap();
    assert_eq!(
      value.to_str().unwrap(),
      "ab_uid=tok; Max-Age=31536000; Path=/; HttpOnly; SameSite=Lax"
    );
  }
}
