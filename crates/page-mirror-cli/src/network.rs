//! CDP network event pump.
//!
//! Chromium reports a response in three steps: the request is sent, response
//! headers arrive, loading finishes. A response is handed to the capture
//! coordinator only once all three have been seen, so captures run in network
//! completion order and always carry the real request method.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::page::Page;
use futures::stream::{BoxStream, StreamExt};
use page_mirror::{CaptureCoordinator, CapturedResponse, ResourceType};

#[derive(Debug)]
struct ResponseHead {
    url: String,
    status: u16,
    resource_type: ResourceType,
}

/// Everything seen so far for one request id.
#[derive(Debug, Default)]
struct Exchange {
    method: Option<String>,
    head: Option<ResponseHead>,
    finished: bool,
}

/// Joins the per-request network events into [`CapturedResponse`]s.
///
/// Events arrive on separate channels and can be delivered in any order, so
/// each step may be the one that completes the exchange.
#[derive(Debug, Default)]
pub struct ResponseTracker {
    exchanges: HashMap<String, Exchange>,
}

impl ResponseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request was sent.
    pub fn on_request(&mut self, request_id: &str, method: &str) -> Option<CapturedResponse> {
        self.entry(request_id).method = Some(method.to_string());
        self.complete(request_id)
    }

    /// A request was redirected. Redirect responses have no body and are
    /// returned immediately, carrying the method of the hop that was
    /// redirected (`fallback_method` if that hop was never seen).
    pub fn on_redirect(
        &mut self,
        request_id: &str,
        url: &str,
        status: u16,
        resource_type: ResourceType,
        fallback_method: &str,
    ) -> CapturedResponse {
        let method = self
            .exchanges
            .get(request_id)
            .and_then(|e| e.method.clone())
            .unwrap_or_else(|| fallback_method.to_string());
        CapturedResponse::new(request_id, url, status, resource_type, method)
    }

    /// Response headers arrived.
    pub fn on_response(
        &mut self,
        request_id: &str,
        url: &str,
        status: u16,
        resource_type: ResourceType,
    ) -> Option<CapturedResponse> {
        self.entry(request_id).head = Some(ResponseHead {
            url: url.to_string(),
            status,
            resource_type,
        });
        self.complete(request_id)
    }

    /// Loading finished; the body can be read.
    pub fn on_finished(&mut self, request_id: &str) -> Option<CapturedResponse> {
        self.entry(request_id).finished = true;
        self.complete(request_id)
    }

    /// Loading failed; nothing to capture.
    pub fn on_failed(&mut self, request_id: &str) {
        self.exchanges.remove(request_id);
    }

    /// Requests not yet handed off.
    pub fn pending(&self) -> usize {
        self.exchanges.len()
    }

    fn entry(&mut self, request_id: &str) -> &mut Exchange {
        self.exchanges.entry(request_id.to_string()).or_default()
    }

    fn complete(&mut self, request_id: &str) -> Option<CapturedResponse> {
        let ready = self
            .exchanges
            .get(request_id)
            .is_some_and(|e| e.finished && e.method.is_some() && e.head.is_some());
        if !ready {
            return None;
        }
        let exchange = self.exchanges.remove(request_id)?;
        let (method, head) = (exchange.method?, exchange.head?);
        Some(CapturedResponse::new(
            request_id,
            head.url,
            head.status,
            head.resource_type,
            method,
        ))
    }
}

enum NetworkEvent {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

/// Subscribed network event streams for one page.
pub struct NetworkPump {
    events: BoxStream<'static, NetworkEvent>,
}

impl NetworkPump {
    /// Subscribe to the page's network events. Must happen before navigation
    /// so no response is missed.
    pub async fn subscribe(page: &Page) -> Result<Self> {
        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to subscribe to requestWillBeSent")?
            .map(NetworkEvent::Request);
        let responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to responseReceived")?
            .map(NetworkEvent::Response);
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("failed to subscribe to loadingFinished")?
            .map(NetworkEvent::Finished);
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .context("failed to subscribe to loadingFailed")?
            .map(NetworkEvent::Failed);

        let events = futures::stream::select_all([
            requests.boxed(),
            responses.boxed(),
            finished.boxed(),
            failed.boxed(),
        ])
        .boxed();
        Ok(Self { events })
    }

    /// Forward finished responses until the page's event streams end.
    pub async fn run(mut self, coordinator: CaptureCoordinator) {
        let mut tracker = ResponseTracker::new();
        while let Some(event) = self.events.next().await {
            match event {
                NetworkEvent::Request(ev) => {
                    let id = ev.request_id.inner();
                    if let Some(redirect) = &ev.redirect_response {
                        let resource_type = ev
                            .r#type
                            .as_ref()
                            .map(|t| resource_type(t.as_ref()))
                            .unwrap_or(ResourceType::Other);
                        coordinator.dispatch(tracker.on_redirect(
                            id,
                            &redirect.url,
                            status(redirect.status),
                            resource_type,
                            &ev.request.method,
                        ));
                    }
                    if let Some(response) = tracker.on_request(id, &ev.request.method) {
                        coordinator.dispatch(response);
                    }
                }
                NetworkEvent::Response(ev) => {
                    if let Some(response) = tracker.on_response(
                        ev.request_id.inner(),
                        &ev.response.url,
                        status(ev.response.status),
                        resource_type(ev.r#type.as_ref()),
                    ) {
                        coordinator.dispatch(response);
                    }
                }
                NetworkEvent::Finished(ev) => {
                    if let Some(response) = tracker.on_finished(ev.request_id.inner()) {
                        coordinator.dispatch(response);
                    }
                }
                NetworkEvent::Failed(ev) => {
                    tracing::debug!(
                        request_id = %ev.request_id.inner(),
                        "Request failed: {}",
                        ev.error_text
                    );
                    tracker.on_failed(ev.request_id.inner());
                }
            }
        }
        tracing::debug!(pending = tracker.pending(), "Network event stream closed");
    }
}

fn resource_type(name: &str) -> ResourceType {
    name.parse().unwrap_or(ResourceType::Other)
}

fn status(raw: i64) -> u16 {
    u16::try_from(raw).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_dispatched_on_finish() {
        let mut tracker = ResponseTracker::new();
        tracker.on_request("1", "GET");
        assert!(tracker
            .on_response("1", "https://x/app.js", 200, ResourceType::Script)
            .is_none());
        assert_eq!(tracker.pending(), 1);

        let response = tracker.on_finished("1").unwrap();
        assert_eq!(response.url, "https://x/app.js");
        assert_eq!(response.method, "GET");
        assert_eq!(response.resource_type, ResourceType::Script);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_finish_before_response() {
        let mut tracker = ResponseTracker::new();
        tracker.on_request("7", "POST");
        assert!(tracker.on_finished("7").is_none());

        let response = tracker
            .on_response("7", "https://x/form.css", 200, ResourceType::Stylesheet)
            .unwrap();
        assert_eq!(response.method, "POST");
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_failed_request_dropped() {
        let mut tracker = ResponseTracker::new();
        tracker.on_request("3", "GET");
        tracker.on_response("3", "https://x/big.woff2", 200, ResourceType::Font);
        tracker.on_failed("3");
        assert_eq!(tracker.pending(), 0);
        assert!(tracker.on_finished("3").is_none());
    }

    #[test]
    fn test_preflight_keeps_method() {
        let mut tracker = ResponseTracker::new();
        tracker.on_request("9", "OPTIONS");
        tracker.on_response("9", "https://api/x.json", 204, ResourceType::Other);
        let response = tracker.on_finished("9").unwrap();
        assert_eq!(response.method, "OPTIONS");
    }

    #[test]
    fn test_response_waits_for_request_event() {
        let mut tracker = ResponseTracker::new();
        assert!(tracker
            .on_response("p1", "https://api.test/config.json", 204, ResourceType::Other)
            .is_none());
        assert!(tracker.on_finished("p1").is_none());
        assert_eq!(tracker.pending(), 1);

        let response = tracker.on_request("p1", "OPTIONS").unwrap();
        assert_eq!(response.method, "OPTIONS");
        assert_eq!(response.url, "https://api.test/config.json");
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_finish_then_request_then_response() {
        let mut tracker = ResponseTracker::new();
        assert!(tracker.on_finished("8").is_none());
        assert!(tracker.on_request("8", "GET").is_none());
        let response = tracker
            .on_response("8", "https://x/logo.svg", 200, ResourceType::Image)
            .unwrap();
        assert_eq!(response.method, "GET");
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_redirect_keeps_request_method() {
        let mut tracker = ResponseTracker::new();
        tracker.on_request("5", "POST");
        let redirect = tracker.on_redirect("5", "http://x/a.js", 307, ResourceType::Script, "POST");
        assert_eq!(redirect.status, 307);
        assert_eq!(redirect.method, "POST");

        let unseen = tracker.on_redirect("6", "http://x/b.js", 301, ResourceType::Script, "GET");
        assert_eq!(unseen.method, "GET");
    }

    #[test]
    fn test_helpers() {
        assert_eq!(resource_type("XHR"), ResourceType::Xhr);
        assert_eq!(resource_type("Preflight"), ResourceType::Other);
        assert_eq!(status(304), 304);
        assert_eq!(status(-1), 0);
    }
}
