//! HTTP routes of the gate
//!
//! The gate itself is transport agnostic; this module reads the body and the
//! session cookie, runs the gate and writes the reply and the cookie back.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use warp::http::header::{HeaderValue, SET_COOKIE};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Reply};

use crate::constants::{API_PATH, AUTHENTICATION_FAILED_MESSAGE, FIRST_FACTOR_PATH};
use crate::core::session::generate_session_id;
use crate::handlers::first_factor::FirstFactorGate;
use crate::handlers::response::{GateResponse, ReplyBody};

/// Largest accepted first factor body
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Attributes of the session cookie
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub domain: Option<String>,
}

impl SessionCookie {
    pub fn new(name: String, domain: Option<String>) -> Self {
        Self { name, domain }
    }

    /// Value of the cookie named after this one in a `Cookie` header
    pub fn extract<'a>(&self, header: &'a str) -> Option<&'a str> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// `Set-Cookie` header value for `session_id`
    pub fn header_value(&self, session_id: &str, max_age: Option<Duration>) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; Secure; SameSite=Lax",
            self.name, session_id
        );
        if let Some(ref domain) = self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }
        if let Some(max_age) = max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        cookie
    }
}

/// All routes served by the gate
pub fn routes(
    gate: Arc<FirstFactorGate>,
    cookie: SessionCookie,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    let cookie = Arc::new(cookie);

    let first_factor = warp::path(API_PATH)
        .and(warp::path(FIRST_FACTOR_PATH))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_gate(gate))
        .and(warp::any().map(move || Arc::clone(&cookie)))
        .and_then(handle_first_factor);

    let health = warp::path(API_PATH)
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    first_factor.or(health)
}

// Helper function to include the gate in request
fn with_gate(
    gate: Arc<FirstFactorGate>,
) -> impl Filter<Extract = (Arc<FirstFactorGate>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&gate))
}

async fn handle_first_factor(
    body: Bytes,
    cookie_header: Option<String>,
    gate: Arc<FirstFactorGate>,
    cookie: Arc<SessionCookie>,
) -> Result<warp::reply::Response, Infallible> {
    let session_id = cookie_header
        .as_deref()
        .and_then(|header| cookie.extract(header))
        .map(String::from)
        .unwrap_or_else(generate_session_id);

    // Run detached so a client going away cannot cancel a request halfway
    // through session mutation or before its delay completed
    let task = tokio::spawn(async move { gate.handle(&body, session_id).await });

    let response = match task.await {
        Ok(response) => response,
        Err(e) => {
            log::error!("First factor task failed: {}", e);
            let reply = warp::reply::with_status(
                warp::reply::json(&ReplyBody::ko(AUTHENTICATION_FAILED_MESSAGE.to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            );
            return Ok(reply.into_response());
        }
    };

    Ok(into_reply(response, &cookie))
}

fn into_reply(response: GateResponse, cookie: &SessionCookie) -> warp::reply::Response {
    let mut reply =
        warp::reply::with_status(warp::reply::json(&response.body), response.status).into_response();

    let set_cookie = cookie.header_value(&response.session_id, response.session_max_age);
    match HeaderValue::from_str(&set_cookie) {
        Ok(value) => {
            reply.headers_mut().insert(SET_COOKIE, value);
        }
        Err(e) => log::error!("Unable to build session cookie header: {}", e),
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie() -> SessionCookie {
        SessionCookie::new("auth_gate_session".to_string(), Some("example.com".to_string()))
    }

    #[test]
    fn test_extract_session_cookie() {
        let cookie = cookie();
        assert_eq!(cookie.extract("auth_gate_session=abc"), Some("abc"));
        assert_eq!(cookie.extract("theme=dark; auth_gate_session=abc; lang=en"), Some("abc"));
        assert_eq!(cookie.extract("other_session=abc"), None);
        assert_eq!(cookie.extract("auth_gate_session="), None);
    }

    #[test]
    fn test_header_value() {
        let cookie = cookie();
        assert_eq!(
            cookie.header_value("abc", None),
            "auth_gate_session=abc; Path=/; HttpOnly; Secure; SameSite=Lax; Domain=example.com"
        );
        assert!(cookie
            .header_value("abc", Some(Duration::from_secs(60)))
            .ends_with("; Max-Age=60"));
    }
}
