//! Test doubles shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gx_core::error::TransportError;
use gx_core::transport::{HttpRequest, HttpResponse, HttpTransport};

type Reply = Result<HttpResponse, TransportError>;

/// Scripted transport: replays queued replies in order, then repeats the
/// fallback. Counts and records every request.
pub struct FakeTransport {
    queue: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn always(reply: Reply) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(body: &str) -> Self {
        Self::always(Ok(HttpResponse::new(200, body)))
    }

    pub fn then(self, reply: Reply) -> Self {
        self.queue.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
