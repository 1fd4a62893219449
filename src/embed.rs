use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

pub const FORM_ID: &str = "KYldG7";
pub const WIDGET_SCRIPT_URL: &str = "https://tally.so/widgets/embed.js";
pub const DEFAULT_EMBED_TITLE: &str = "RSVP to Mărțișor Event";

const POLL_INTERVAL: Duration = Duration::from_millis(60);
const POLL_BUDGET: Duration = Duration::from_millis(2500);

/// Embedded-frame source: left-aligned, no title, transparent background,
/// dynamic height.
pub fn embed_url() -> String {
    let mut url = Url::parse("https://tally.so/embed/").expect("embed base url is valid");
    url.path_segments_mut()
        .expect("embed base url has a path")
        .push(FORM_ID);
    url.query_pairs_mut()
        .append_pair("alignLeft", "1")
        .append_pair("hideTitle", "1")
        .append_pair("transparentBackground", "1")
        .append_pair("dynamicHeight", "1");
    url.to_string()
}

/// Hash-fragment popup link carrying the form id plus emoji display hints.
pub fn popup_href() -> String {
    let emoji = utf8_percent_encode("👋", NON_ALPHANUMERIC);
    format!("#tally-open={FORM_ID}&tally-emoji-text={emoji}&tally-emoji-animation=wave")
}

pub fn is_popup_href(target: &str) -> bool {
    target
        .strip_prefix("#tally-open=")
        .is_some_and(|rest| rest.starts_with(FORM_ID))
}

/// Plain form page, for handing the RSVP off to a browser.
pub fn form_page_url() -> String {
    format!("https://tally.so/r/{FORM_ID}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeStatus {
    NotLoaded,
    Loading,
    Ready,
}

/// Seam for the widget-activation script. The core only ever asks whether
/// the script is present, starts loading it at most once, and invokes the
/// activation entry point when available.
pub trait WidgetRuntime: Send + Sync {
    fn status(&self) -> RuntimeStatus;
    fn begin_load(&self);
    fn activate(&self);
}

/// The shipped runtime: a script load that completes shortly after it is
/// started. The rest of the experience is scripted; so is this.
pub struct SimulatedRuntime {
    started: Mutex<Option<Instant>>,
    ready_after: Duration,
    activations: AtomicUsize,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::with_ready_after(Duration::from_millis(300))
    }

    pub fn with_ready_after(ready_after: Duration) -> Self {
        Self {
            started: Mutex::new(None),
            ready_after,
            activations: AtomicUsize::new(0),
        }
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetRuntime for SimulatedRuntime {
    fn status(&self) -> RuntimeStatus {
        match *self.started.lock() {
            None => RuntimeStatus::NotLoaded,
            Some(at) if at.elapsed() >= self.ready_after => RuntimeStatus::Ready,
            Some(_) => RuntimeStatus::Loading,
        }
    }

    fn begin_load(&self) {
        let mut started = self.started.lock();
        if started.is_none() {
            *started = Some(Instant::now());
        }
    }

    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WidgetError {
    #[error("widget script never became ready")]
    ScriptUnavailable,
}

/// Ensures the activation script is loaded (reusing an in-flight load) and
/// reports readiness over a channel. A loading script is polled briefly;
/// past the budget the caller falls back to deferred frame sources. No
/// retries beyond that single bounded poll.
pub struct Activator {
    runtime: Arc<dyn WidgetRuntime>,
    interval: Duration,
    budget: Duration,
}

impl Activator {
    pub fn new(runtime: Arc<dyn WidgetRuntime>) -> Self {
        Self::with_timing(runtime, POLL_INTERVAL, POLL_BUDGET)
    }

    pub fn with_timing(runtime: Arc<dyn WidgetRuntime>, interval: Duration, budget: Duration) -> Self {
        Self {
            runtime,
            interval,
            budget,
        }
    }

    /// Answer immediately when the script is already usable, otherwise
    /// poll from a worker thread and report the outcome on `tx`.
    pub fn request(&self, tx: Sender<Result<(), WidgetError>>) {
        match self.runtime.status() {
            RuntimeStatus::Ready => {
                let _ = tx.send(Ok(()));
            }
            RuntimeStatus::NotLoaded | RuntimeStatus::Loading => {
                if self.runtime.status() == RuntimeStatus::NotLoaded {
                    self.runtime.begin_load();
                }
                let runtime = self.runtime.clone();
                let interval = self.interval;
                let budget = self.budget;
                thread::spawn(move || {
                    let started = Instant::now();
                    loop {
                        if runtime.status() == RuntimeStatus::Ready {
                            let _ = tx.send(Ok(()));
                            return;
                        }
                        if started.elapsed() > budget {
                            let _ = tx.send(Err(WidgetError::ScriptUnavailable));
                            return;
                        }
                        thread::sleep(interval);
                    }
                });
            }
        }
    }

    pub fn activate(&self) {
        self.runtime.activate();
    }
}

/// An embedded form frame inside a chat bubble. The source stays deferred
/// until the widget activates it, or until the fallback assigns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedFrame {
    pub title: String,
    pub deferred_src: String,
    pub src: Option<String>,
    pub live: bool,
}

impl EmbedFrame {
    pub fn new() -> Self {
        Self {
            title: DEFAULT_EMBED_TITLE.to_string(),
            deferred_src: embed_url(),
            src: None,
            live: false,
        }
    }

    /// Widget entry point became available: the frame goes live.
    pub fn activate(&mut self) {
        self.src = Some(self.deferred_src.clone());
        self.live = true;
    }

    /// Manual fallback when the entry point never appears.
    pub fn assign_deferred(&mut self) {
        if self.src.is_none() {
            self.src = Some(self.deferred_src.clone());
        }
    }
}

impl Default for EmbedFrame {
    fn default() -> Self {
        Self::new()
    }
}
