//! Basic and Digest-Access (RFC 2617) authentication, per spec.md §4.9.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest, Md5};

/// Which scheme(s) `preflight` should challenge/validate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationMethod {
    Basic,
    Digest,
}

/// Plaintext account table for Basic auth; Digest stores `MD5(user:realm:password)`
/// (`HA1`) instead, computed once at construction so the plaintext password
/// is never retained for that scheme.
pub struct AuthConfig {
    pub method: AuthenticationMethod,
    pub realm: String,
    accounts_plain: HashMap<String, String>,
    accounts_ha1: HashMap<String, String>,
    nonce: Mutex<String>,
}

impl AuthConfig {
    pub fn new(method: AuthenticationMethod, realm: impl Into<String>, accounts: HashMap<String, String>) -> Self {
        let realm = realm.into();
        let accounts_ha1 = accounts
            .iter()
            .map(|(user, pass)| (user.clone(), ha1(user, &realm, pass)))
            .collect();
        Self {
            method,
            realm,
            accounts_plain: accounts,
            accounts_ha1,
            nonce: Mutex::new(fresh_nonce()),
        }
    }

    /// The `WWW-Authenticate` challenge header value for a 401 response.
    pub fn challenge(&self) -> String {
        match self.method {
            AuthenticationMethod::Basic => format!("Basic realm=\"{}\"", self.realm),
            AuthenticationMethod::Digest => {
                let nonce = self.nonce.lock().unwrap().clone();
                format!(
                    "Digest realm=\"{}\", nonce=\"{}\", opaque=\"{}\"",
                    self.realm, nonce, opaque_for(&self.realm)
                )
            }
        }
    }

    /// Validates an `Authorization` header value against the configured
    /// scheme. `method`/`uri` are the request's method and request-target,
    /// needed for Digest's `HA2`.
    pub fn validate(&self, authorization: &str, method: &str, uri: &str) -> bool {
        match self.method {
            AuthenticationMethod::Basic => self.validate_basic(authorization),
            AuthenticationMethod::Digest => self.validate_digest(authorization, method, uri),
        }
    }

    fn validate_basic(&self, authorization: &str) -> bool {
        let encoded = match authorization.strip_prefix("Basic ") {
            Some(v) => v,
            None => return false,
        };
        let decoded = match BASE64.decode(encoded) {
            Ok(d) => d,
            Err(_) => return false,
        };
        let text = match String::from_utf8(decoded) {
            Ok(t) => t,
            Err(_) => return false,
        };
        let (user, pass) = match text.split_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        self.accounts_plain.get(user).map(|p| p == pass).unwrap_or(false)
    }

    fn validate_digest(&self, authorization: &str, method: &str, uri: &str) -> bool {
        let params = match authorization.strip_prefix("Digest ") {
            Some(v) => parse_digest_params(v),
            None => return false,
        };

        let (user, nonce, response, req_uri) = match (
            params.get("username"),
            params.get("nonce"),
            params.get("response"),
            params.get("uri"),
        ) {
            (Some(u), Some(n), Some(r), Some(ru)) => (u, n, r, ru),
            _ => return false,
        };

        if *nonce != self.nonce.lock().unwrap().as_str() {
            return false;
        }

        let ha1 = match self.accounts_ha1.get(*user) {
            Some(h) => h,
            None => return false,
        };
        let ha2 = hex_md5(format!("{}:{}", method, uri));
        let expected = hex_md5(format!("{}:{}:{}", ha1, nonce, ha2));

        expected == *response && *req_uri == uri
    }

    /// Rotates the server-side nonce, e.g. on a schedule or after repeated
    /// failures; not invoked automatically by this crate.
    pub fn rotate_nonce(&self) {
        *self.nonce.lock().unwrap() = fresh_nonce();
    }
}

fn ha1(user: &str, realm: &str, password: &str) -> String {
    hex_md5(format!("{}:{}:{}", user, realm, password))
}

fn hex_md5(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_ref());
    format!("{:x}", hasher.finalize())
}

fn fresh_nonce() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

fn opaque_for(realm: &str) -> String {
    hex_md5(realm)
}

fn parse_digest_params(raw: &str) -> HashMap<&str, &str> {
    let mut map = HashMap::new();
    for part in raw.split(',') {
        let part = part.trim();
        if let Some((k, v)) = part.split_once('=') {
            map.insert(k.trim(), v.trim().trim_matches('"'));
        }
    }
    map
}

mod hex {
    pub fn encode(bytes: [u8; 16]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
