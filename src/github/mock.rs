//! Scripted [`Transport`] double for unit tests.
//!
//! Replies are queued per exact URL and consumed in order; once a URL's
//! queue is empty its fallback (if any) is served, otherwise a 404.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::http::{HttpResponse, Transport};
use crate::errors::FetchError;

#[derive(Debug, Clone)]
pub enum Reply {
    Response(HttpResponse),
    Error(FetchError),
    /// Never completes; only a timeout gets the caller out.
    Hang,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Reply::Response(HttpResponse::ok(body))
    }

    pub fn status(status: u16) -> Self {
        Reply::Response(HttpResponse {
            status,
            reason: format!("Status {}", status),
            rate_limit_reset: None,
            body: String::new(),
        })
    }

    pub fn rate_limited(reset: i64) -> Self {
        Reply::Response(HttpResponse {
            status: 403,
            reason: "Forbidden".to_string(),
            rate_limit_reset: Some(reset),
            body: String::new(),
        })
    }

    pub fn network(message: &str) -> Self {
        Reply::Error(FetchError::Network(message.to_string()))
    }

    pub fn hang() -> Self {
        Reply::Hang
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    fallback: HashMap<String, Reply>,
    calls: HashMap<String, Vec<Instant>>,
    headers: HashMap<String, Vec<(String, String)>>,
}

#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, reply: Reply) {
        let mut script = self.script.lock().unwrap();
        script
            .queued
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_fallback(&self, url: &str, reply: Reply) {
        let mut script = self.script.lock().unwrap();
        script.fallback.insert(url.to_string(), reply);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.call_times(url).len()
    }

    pub fn total_calls(&self) -> usize {
        let script = self.script.lock().unwrap();
        script.calls.values().map(Vec::len).sum()
    }

    pub fn call_times(&self, url: &str) -> Vec<Instant> {
        let script = self.script.lock().unwrap();
        script.calls.get(url).cloned().unwrap_or_default()
    }

    pub fn last_headers(&self, url: &str) -> Option<Vec<(String, String)>> {
        let script = self.script.lock().unwrap();
        script.headers.get(url).cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str, headers: &[(String, String)]) -> Reply {
        let mut script = self.script.lock().unwrap();
        script
            .calls
            .entry(url.to_string())
            .or_default()
            .push(Instant::now());
        script.headers.insert(url.to_string(), headers.to_vec());

        if let Some(reply) = script.queued.get_mut(url).and_then(VecDeque::pop_front) {
            return reply;
        }
        script
            .fallback
            .get(url)
            .cloned()
            .unwrap_or_else(|| Reply::status(404))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut reply = self.next_reply(url, headers);
        loop {
            match reply {
                Reply::Response(resp) => return Ok(resp),
                Reply::Error(err) => return Err(err),
                Reply::Hang => return std::future::pending().await,
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

/// Decrements the in-flight counter even when the request future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
