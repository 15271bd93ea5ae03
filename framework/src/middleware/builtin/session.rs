use super::cookie_parser::parse_cookie_header;
use super::object_arg;
use crate::config::security::generate_secret;
use crate::config::SessionStoreKind;
use crate::error::FrameworkError;
use crate::http::{map_response, Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use http::header::COOKIE;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

type HmacSha256 = Hmac<Sha256>;

/// Idle time after which a stored session is forgotten
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Most sessions kept at once; the least recently seen is evicted first
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Session ids kept in process memory, keyed to when they were last seen
struct MemoryStore {
    ids: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl MemoryStore {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ids: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Refresh a live id; expired ids are dropped and reported missing
    fn touch(&self, id: &str) -> bool {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match ids.get_mut(id) {
            Some(seen) if now.duration_since(*seen) < self.ttl => {
                *seen = now;
                true
            }
            Some(_) => {
                ids.remove(id);
                false
            }
            None => false,
        }
    }

    fn insert(&self, id: String) {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let ttl = self.ttl;
        ids.retain(|_, seen| now.duration_since(*seen) < ttl);

        while ids.len() >= self.capacity {
            let oldest = ids
                .iter()
                .min_by_key(|(_, seen)| **seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    ids.remove(&oldest);
                }
                None => break,
            }
        }
        ids.insert(id, now);
    }

    fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Issues a session cookie and exposes the id as the `sessionId` local
///
/// The cookie value is `<id>.<signature>`, an HMAC-SHA256 of the id keyed by
/// `options.secret`; cookies whose signature does not verify are replaced.
/// Sessions idle for longer than `options.ttl` seconds expire, and at most
/// `options.maxSessions` are kept.
///
/// Only the in-memory store is backed here; other store kinds log a
/// warning at construction and fall back to memory.
pub struct Session {
    key: String,
    mac: HmacSha256,
    store: MemoryStore,
}

impl Session {
    pub fn new(key: impl Into<String>, secret: &str) -> Result<Self, FrameworkError> {
        Self::with_limits(key, secret, DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_limits(
        key: impl Into<String>,
        secret: &str,
        ttl: Duration,
        max_sessions: usize,
    ) -> Result<Self, FrameworkError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| FrameworkError::invalid_middleware("session", format!("unusable secret: {}", e)))?;
        Ok(Self {
            key: key.into(),
            mac,
            store: MemoryStore::new(ttl, max_sessions),
        })
    }

    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        let options = object_arg("session", &args)?;

        let key = options
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| FrameworkError::invalid_middleware("session", "missing options.key"))?;
        let secret = options
            .get("secret")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FrameworkError::invalid_middleware("session", "missing options.secret"))?;

        let module = options
            .get("store")
            .and_then(|s| s.get("module"))
            .and_then(Value::as_str)
            .unwrap_or("memory");
        match SessionStoreKind::parse(module) {
            Some(SessionStoreKind::Memory) => {}
            Some(kind) => tracing::warn!(
                store = kind.as_str(),
                "session store backend is not available, keeping sessions in memory"
            ),
            None => {
                return Err(FrameworkError::UnsupportedSessionStore {
                    store: module.to_string(),
                })
            }
        }

        let ttl = match options.get("ttl") {
            None | Some(Value::Null) => DEFAULT_SESSION_TTL,
            Some(value) => value.as_u64().map(Duration::from_secs).ok_or_else(|| {
                FrameworkError::invalid_middleware("session", "options.ttl must be a number of seconds")
            })?,
        };
        let max_sessions = match options.get("maxSessions") {
            None | Some(Value::Null) => DEFAULT_MAX_SESSIONS,
            Some(value) => value
                .as_u64()
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    FrameworkError::invalid_middleware("session", "options.maxSessions must be a positive number")
                })?,
        };

        Ok(Arc::new(Self::with_limits(key, secret, ttl, max_sessions)?))
    }

    fn sign(&self, id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        format!("{}.{}", id, hex::encode(mac.finalize().into_bytes()))
    }

    /// The id carried by a signed cookie value, if the signature verifies
    fn unsign<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (id, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(id)
    }

    fn incoming_cookie(&self, request: &Request) -> Option<String> {
        if let Some(value) = request.cookie(&self.key) {
            return Some(value.to_string());
        }
        request
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .find(|(name, _)| *name == self.key)
            .map(|(_, value)| value)
    }

    fn incoming_id(&self, request: &Request) -> Option<String> {
        let cookie = self.incoming_cookie(request)?;
        let id = self.unsign(&cookie)?;
        self.store.touch(id).then(|| id.to_string())
    }
}

#[async_trait]
impl Middleware for Session {
    async fn handle(&self, mut request: Request, next: Next) -> Response {
        let (id, issued) = match self.incoming_id(&request) {
            Some(id) => (id, false),
            None => {
                let id = generate_secret();
                self.store.insert(id.clone());
                (id, true)
            }
        };
        request.set_local("sessionId", id.as_str());

        let response = next.run(request).await;
        if !issued {
            return response;
        }
        let cookie = format!("{}={}; Path=/; HttpOnly", self.key, self.sign(&id));
        map_response(response, |mut r| {
            r.append_header("Set-Cookie", cookie);
            r
        })
    }
}
