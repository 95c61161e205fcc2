//! Page observation channels
//!
//! Six CDP event streams are merged into one task per page:
//!
//! ```text
//! Runtime.consoleAPICalled ──┐
//! Runtime.exceptionThrown  ──┤
//! Network.requestWillBeSent ─┤
//! Network.loadingFinished  ──┼──> observer task ──> CaptureLogger
//! Network.loadingFailed    ──┤                  └─> crash signal
//! Inspector.targetCrashed  ──┘
//! ```
//!
//! Nothing here retries. A crash only flips the signal; the driver turns it
//! into an error for whichever render is in flight.

use crate::error::Result;
use crate::logger::SharedLogger;
use chromiumoxide::cdp::browser_protocol::inspector::{
    EnableParams as InspectorEnableParams, EventTargetCrashed,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::FrameId;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, ExceptionDetails,
    RemoteObject,
};
use chromiumoxide::Page;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Sender side of the crash signal; `Some(reason)` once the browser is gone
pub type CrashSignal = Arc<watch::Sender<Option<String>>>;

/// Record the first crash reason; later reasons are dropped
pub fn signal_crash(signal: &watch::Sender<Option<String>>, reason: impl Into<String>) {
    let reason = reason.into();
    signal.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    });
}

/// Console severity after mapping to the logger's three levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// log, info, debug, ...
    Info,
    /// console.warn
    Warn,
    /// console.error, failed console.assert
    Error,
}

impl ConsoleLevel {
    /// Map a CDP console call type
    pub fn from_cdp(kind: &ConsoleApiCalledType) -> Self {
        match kind {
            ConsoleApiCalledType::Warning => ConsoleLevel::Warn,
            ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
            _ => ConsoleLevel::Info,
        }
    }
}

/// A sub-resource or document that failed to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    /// Network error code, e.g. `net::ERR_CONNECTION_REFUSED`
    pub error_code: String,
    /// Human readable description
    pub description: String,
    /// URL of the failed request (empty when it was never seen)
    pub url: String,
    /// Whether the failed request was the main frame's document
    pub is_main_frame: bool,
}

impl LoadFailure {
    /// Single-line log message
    pub fn message(&self) -> String {
        format!(
            "Failed to load {} ({}: {}){}",
            if self.url.is_empty() { "<unknown>" } else { &self.url },
            self.error_code,
            self.description,
            if self.is_main_frame { " [main frame]" } else { "" }
        )
    }
}

/// Requests in flight, keyed by CDP request id
///
/// Entries live from `requestWillBeSent` until the request finishes or
/// fails, so the map stays bounded on a page reused for many loads.
#[derive(Debug, Default)]
struct PendingRequests {
    requests: HashMap<String, (String, bool)>,
}

impl PendingRequests {
    fn sent(&mut self, id: &str, url: String, is_main_frame: bool) {
        self.requests.insert(id.to_string(), (url, is_main_frame));
    }

    fn finished(&mut self, id: &str) {
        self.requests.remove(id);
    }

    fn failed(&mut self, id: &str, error_code: String, description: String) -> LoadFailure {
        let (url, is_main_frame) = self.requests.remove(id).unwrap_or_default();
        LoadFailure {
            error_code,
            description,
            url,
            is_main_frame,
        }
    }

    fn len(&self) -> usize {
        self.requests.len()
    }
}

enum PageEvent {
    Console(Arc<EventConsoleApiCalled>),
    Exception(Arc<EventExceptionThrown>),
    Request(Arc<EventRequestWillBeSent>),
    LoadingFinished(Arc<EventLoadingFinished>),
    LoadingFailed(Arc<EventLoadingFailed>),
    Crashed(Arc<EventTargetCrashed>),
}

/// Subscribe to the page's event streams and spawn the observer task
pub async fn observe(page: &Page, logger: SharedLogger, crash: CrashSignal) -> Result<JoinHandle<()>> {
    page.execute(InspectorEnableParams::default()).await?;
    let main_frame = page.mainframe().await?;

    let streams: Vec<BoxStream<'static, PageEvent>> = vec![
        page.event_listener::<EventConsoleApiCalled>()
            .await?
            .map(PageEvent::Console)
            .boxed(),
        page.event_listener::<EventExceptionThrown>()
            .await?
            .map(PageEvent::Exception)
            .boxed(),
        page.event_listener::<EventRequestWillBeSent>()
            .await?
            .map(PageEvent::Request)
            .boxed(),
        page.event_listener::<EventLoadingFinished>()
            .await?
            .map(PageEvent::LoadingFinished)
            .boxed(),
        page.event_listener::<EventLoadingFailed>()
            .await?
            .map(PageEvent::LoadingFailed)
            .boxed(),
        page.event_listener::<EventTargetCrashed>()
            .await?
            .map(PageEvent::Crashed)
            .boxed(),
    ];

    let mut events = stream::select_all(streams);
    let task = tokio::spawn(async move {
        let mut requests = PendingRequests::default();

        while let Some(event) = events.next().await {
            match event {
                PageEvent::Console(event) => {
                    let text = console_text(&event.args);
                    match ConsoleLevel::from_cdp(&event.r#type) {
                        ConsoleLevel::Info => logger.info(&text),
                        ConsoleLevel::Warn => logger.warn(&text),
                        ConsoleLevel::Error => logger.error(&text),
                    }
                }
                PageEvent::Exception(event) => {
                    logger.error(&exception_text(&event.exception_details));
                }
                PageEvent::Request(event) => {
                    let is_main_frame = matches!(event.r#type, Some(ResourceType::Document))
                        && is_same_frame(event.frame_id.as_ref(), main_frame.as_ref());
                    requests.sent(
                        event.request_id.inner(),
                        event.request.url.clone(),
                        is_main_frame,
                    );
                }
                PageEvent::LoadingFinished(event) => {
                    requests.finished(event.request_id.inner());
                }
                PageEvent::LoadingFailed(event) => {
                    let failure = requests.failed(
                        event.request_id.inner(),
                        event.error_text.clone(),
                        describe_failure(&event),
                    );
                    logger.error(&failure.message());
                }
                PageEvent::Crashed(_) => {
                    logger.error("Page renderer crashed");
                    signal_crash(&crash, "page renderer crashed");
                }
            }
        }

        debug!(pending = requests.len(), "Page event streams closed");
    });

    Ok(task)
}

fn is_same_frame(frame: Option<&FrameId>, main_frame: Option<&FrameId>) -> bool {
    match (frame, main_frame) {
        (Some(frame), Some(main)) => frame == main,
        // Without a known main frame every document request counts as main
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

fn describe_failure(event: &EventLoadingFailed) -> String {
    if event.canceled.unwrap_or(false) {
        "request canceled".to_string()
    } else if let Some(reason) = &event.blocked_reason {
        format!("blocked ({:?})", reason)
    } else {
        format!("{:?} request failed", event.r#type)
    }
}

/// Join console arguments the way devtools prints them
pub fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .map(remote_object_text)
        .collect::<Vec<_>>()
        .join(" ")
}

fn remote_object_text(object: &RemoteObject) -> String {
    match (&object.value, &object.description) {
        (Some(serde_json::Value::String(s)), _) => s.clone(),
        (Some(value), _) => value.to_string(),
        (None, Some(description)) => description.clone(),
        (None, None) => format!("{:?}", object.r#type).to_lowercase(),
    }
}

/// Uncaught exception message including its stack
pub fn exception_text(details: &ExceptionDetails) -> String {
    // V8 descriptions of Error objects already carry the stack
    if let Some(description) = details
        .exception
        .as_ref()
        .and_then(|e| e.description.as_ref())
    {
        return format!("Uncaught {}", description);
    }

    let mut text = format!(
        "{} ({}:{}:{})",
        details.text,
        details.url.as_deref().unwrap_or("<anonymous>"),
        details.line_number + 1,
        details.column_number + 1
    );
    if let Some(stack) = &details.stack_trace {
        for frame in &stack.call_frames {
            let name = if frame.function_name.is_empty() {
                "<anonymous>"
            } else {
                &frame.function_name
            };
            text.push_str(&format!(
                "\n    at {} ({}:{}:{})",
                name,
                frame.url,
                frame.line_number + 1,
                frame.column_number + 1
            ));
        }
    }
    text
}
