#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use waypoint_engine::backend::{
    ActionKind, Backend, ElementHandle, LaunchOptions, NavigationResult, Viewport,
};
use waypoint_engine::journey::Step;
use waypoint_engine::locator::Locator;
use waypoint_engine::session::{Session, SessionConfig, SessionManager};
use waypoint_common::BackendError;

#[derive(Debug, Clone)]
pub struct ActEvent {
    pub reference: String,
    pub kind: ActionKind,
    pub payload: Option<String>,
    pub at: Instant,
}

/// Everything a scripted backend was asked to do, shared by all its clones.
#[derive(Debug, Default)]
pub struct Journal {
    pub launches: usize,
    pub closes: usize,
    pub cookie_clears: usize,
    pub video_started: Option<PathBuf>,
    pub video_stops: usize,
    pub navigations: Vec<String>,
    pub queries: Vec<String>,
    pub actions: Vec<ActEvent>,
    pub network_waits: usize,
}

impl Journal {
    pub fn queried(&self, locator: &str) -> usize {
        self.queries.iter().filter(|q| q.as_str() == locator).count()
    }

    pub fn acted_on(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.reference.clone()).collect()
    }
}

#[derive(Debug, Clone)]
struct ScriptedElement {
    reference: String,
    text: String,
    /// Queries answered with "not interactable" before the element shows up.
    hidden_for: u32,
}

/// In-memory page whose elements are keyed by locator string.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    elements: HashMap<String, ScriptedElement>,
    invalid: HashSet<String>,
    counts: HashMap<String, usize>,
    failing_acts: HashSet<String>,
    act_delay: Duration,
    fail_launch: bool,
    busy_network: bool,
    video: bool,
    url: String,
    title: String,
    seen: HashMap<String, u32>,
    journal: Arc<Mutex<Journal>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            invalid: HashSet::new(),
            counts: HashMap::new(),
            failing_acts: HashSet::new(),
            act_delay: Duration::ZERO,
            fail_launch: false,
            busy_network: false,
            video: true,
            url: "about:blank".to_string(),
            title: String::new(),
            seen: HashMap::new(),
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    pub fn with_element(self, locator: &str, reference: &str) -> Self {
        self.with_text(locator, reference, reference)
    }

    pub fn with_text(mut self, locator: &str, reference: &str, text: &str) -> Self {
        self.elements.insert(
            locator.to_string(),
            ScriptedElement {
                reference: reference.to_string(),
                text: text.to_string(),
                hidden_for: 0,
            },
        );
        self
    }

    pub fn without_element(mut self, locator: &str) -> Self {
        self.elements.remove(locator);
        self
    }

    /// The element is present but not interactable for the first `polls` queries.
    pub fn appearing_after(mut self, locator: &str, reference: &str, polls: u32) -> Self {
        self.elements.insert(
            locator.to_string(),
            ScriptedElement {
                reference: reference.to_string(),
                text: reference.to_string(),
                hidden_for: polls,
            },
        );
        self
    }

    pub fn with_invalid_selector(mut self, locator: &str) -> Self {
        self.invalid.insert(locator.to_string());
        self
    }

    pub fn with_count(mut self, locator: &str, count: usize) -> Self {
        self.counts.insert(locator.to_string(), count);
        self
    }

    pub fn failing_act(mut self, reference: &str) -> Self {
        self.failing_acts.insert(reference.to_string());
        self
    }

    pub fn with_act_delay(mut self, delay: Duration) -> Self {
        self.act_delay = delay;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn busy_network(mut self) -> Self {
        self.busy_network = true;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.video = false;
        self
    }

    pub fn with_page(mut self, url: &str, title: &str) -> Self {
        self.url = url.to_string();
        self.title = title.to_string();
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        self.journal.clone()
    }

    pub fn manager(&self) -> SessionManager {
        let template = self.clone();
        SessionManager::new(move || Box::new(template.clone()) as Box<dyn Backend>)
    }
}

/// Session config writing into `dir`, with a short default timeout.
pub fn session_config(dir: &Path) -> SessionConfig {
    SessionConfig {
        artifact_root: dir.to_path_buf(),
        default_timeout: Duration::from_millis(300),
        ..SessionConfig::default()
    }
}

pub async fn open_session(backend: &ScriptedBackend, dir: &Path) -> (SessionManager, Session) {
    let manager = backend.manager();
    let session = manager
        .open(&session_config(dir))
        .await
        .expect("session should open");
    (manager, session)
}

/// The search-to-cart journey as eight steps.
pub fn purchase_steps() -> Vec<Step> {
    vec![
        Step::navigate("open-store", "https://shop.example/"),
        Step::fill(
            "search",
            [Locator::css("input[type='search']"), Locator::css("#search")],
            "earbuds",
        )
        .submit_with("Enter"),
        Step::select_filter("Brand", "JBL"),
        Step::select_filter("Color", "Black"),
        Step::select_filter("Price", "Over $50"),
        Step::click("open-product", [Locator::text("JBL Quantum True Wireless")]),
        Step::click("add-to-cart", [Locator::has_text("button", "Add to Cart")]),
        Step::click("open-cart", [Locator::css("a[href*='cart']")]),
    ]
}

/// A storefront where every element of [`purchase_steps`] is interactable.
pub fn storefront() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_page("https://shop.example/", "Shop")
        .with_element("input[type='search']", "search-box")
        .with_element("text=Brand", "brand-toggle")
        .with_element("text=JBL", "jbl-option")
        .with_element("text=Color", "color-toggle")
        .with_element("text=Black", "black-option")
        .with_element("text=Price", "price-toggle")
        .with_element("text=Over $50", "over-50-option")
        .with_element("text=JBL Quantum True Wireless", "product-link")
        .with_element("button:has-text('Add to Cart')", "add-to-cart")
        .with_element("a[href*='cart']", "cart-icon")
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn launch(&mut self, _options: &LaunchOptions) -> Result<(), BackendError> {
        if self.fail_launch {
            return Err(BackendError::Launch("no browser available".into()));
        }
        self.journal.lock().unwrap().launches += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.journal.lock().unwrap().closes += 1;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        self.journal.lock().unwrap().navigations.push(url.to_string());
        self.url = url.to_string();
        Ok(NavigationResult {
            url: url.to_string(),
            title: self.title.clone(),
            status: 200,
        })
    }

    async fn query_interactable(
        &mut self,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>, BackendError> {
        let key = locator.to_string();
        self.journal.lock().unwrap().queries.push(key.clone());

        if self.invalid.contains(&key) {
            return Err(BackendError::SelectorInvalid { selector: key });
        }

        let Some(element) = self.elements.get(&key) else {
            return Ok(None);
        };
        let seen = self.seen.entry(key).or_insert(0);
        *seen += 1;
        if *seen <= element.hidden_for {
            return Ok(None);
        }

        let mut handle = ElementHandle::new(&element.reference).with_text(&element.text);
        handle.tag = "div".to_string();
        Ok(Some(handle))
    }

    async fn act(
        &mut self,
        element: &ElementHandle,
        kind: ActionKind,
        payload: Option<&str>,
    ) -> Result<(), BackendError> {
        if !self.act_delay.is_zero() {
            sleep(self.act_delay).await;
        }
        if self.failing_acts.contains(&element.reference) {
            return Err(BackendError::ElementNotInteractable {
                reference: element.reference.clone(),
                reason: "covered by overlay".into(),
            });
        }
        self.journal.lock().unwrap().actions.push(ActEvent {
            reference: element.reference.clone(),
            kind,
            payload: payload.map(str::to_string),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<bool, BackendError> {
        self.journal.lock().unwrap().network_waits += 1;
        if self.busy_network {
            sleep(timeout).await;
            return Ok(false);
        }
        Ok(true)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        Ok(b"\x89PNG\r\n\x1a\nscripted".to_vec())
    }

    async fn start_video_recording(
        &mut self,
        dir: &Path,
        _size: Viewport,
    ) -> Result<(), BackendError> {
        if !self.video {
            return Err(BackendError::NotSupported("start_video_recording".into()));
        }
        self.journal.lock().unwrap().video_started = Some(dir.to_path_buf());
        Ok(())
    }

    async fn stop_video_recording(&mut self) -> Result<Option<PathBuf>, BackendError> {
        let mut journal = self.journal.lock().unwrap();
        journal.video_stops += 1;
        Ok(journal.video_started.clone())
    }

    async fn clear_cookies(&mut self) -> Result<(), BackendError> {
        self.journal.lock().unwrap().cookie_clears += 1;
        Ok(())
    }

    async fn text_content(&mut self, element: &ElementHandle) -> Result<String, BackendError> {
        Ok(element.text.clone().unwrap_or_default())
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize, BackendError> {
        Ok(self.counts.get(&locator.to_string()).copied().unwrap_or(0))
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Ok(self.url.clone())
    }

    async fn title(&mut self) -> Result<String, BackendError> {
        Ok(self.title.clone())
    }
}
