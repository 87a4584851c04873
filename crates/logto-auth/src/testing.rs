//! Scripted `Requester` for unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::requester::{HttpRequest, HttpResponse, Requester};

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// Routes requests by URL to canned responders and records every call.
#[derive(Default)]
pub struct MockRequester {
    routes: HashMap<String, Responder>,
    calls: Mutex<Vec<HttpRequest>>,
    count: AtomicUsize,
    delay: Option<Duration>,
}

impl MockRequester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn route(
        mut self,
        url: &str,
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    ) -> Self {
        self.routes.insert(url.to_string(), Box::new(responder));
        self
    }

    pub fn json(self, url: &str, status: u16, body: serde_json::Value) -> Self {
        let body = body.to_string();
        self.route(url, move |_| Ok(HttpResponse::new(status, body.clone())))
    }

    pub fn calls_to(&self, url: &str) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Requester for MockRequester {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.routes.get(&request.url) {
                Some(responder) => responder(&request),
                None => Err(Error::Http(format!("no route for {}", request.url))),
            }
        })
    }
}
