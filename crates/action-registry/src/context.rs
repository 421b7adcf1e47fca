//! Collaborators injected into every handler call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Browser driver primitives used by the built-in handlers.
///
/// Element-addressed calls receive the selector-map index; resolving it to a
/// live node is the driver's concern.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;
    async fn go_back(&self) -> anyhow::Result<()>;
    async fn click(&self, index: u32) -> anyhow::Result<()>;
    async fn type_text(&self, index: u32, text: &str) -> anyhow::Result<()>;
    async fn upload_file(&self, index: u32, path: &str) -> anyhow::Result<()>;
    async fn switch_tab(&self, page_id: u32) -> anyhow::Result<()>;
    async fn open_tab(&self, url: &str) -> anyhow::Result<()>;
    async fn close_tab(&self, page_id: u32) -> anyhow::Result<()>;
    /// `amount` of `None` scrolls one viewport.
    async fn scroll(&self, direction: ScrollDirection, amount: Option<u32>) -> anyhow::Result<()>;
    async fn send_keys(&self, keys: &str) -> anyhow::Result<()>;
    /// Returns false when the text is not on the page.
    async fn scroll_to_text(&self, text: &str) -> anyhow::Result<bool>;
    async fn select_option(&self, index: u32, text: &str) -> anyhow::Result<()>;
    /// Page content in a form suitable for extraction (markdown or text).
    async fn content(&self) -> anyhow::Result<String>;
}

/// LLM-backed extraction callable.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract(&self, goal: &str, content: &str) -> anyhow::Result<String>;
}

/// Per-call collaborators. Handlers may ignore any of them.
#[derive(Clone, Default)]
pub struct ActionContext {
    pub page: Option<Arc<dyn BrowserPage>>,
    pub extractor: Option<Arc<dyn PageExtractor>>,
    pub sensitive_data: HashMap<String, String>,
    pub available_file_paths: Vec<String>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: Arc<dyn BrowserPage>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_sensitive_data(mut self, data: HashMap<String, String>) -> Self {
        self.sensitive_data = data;
        self
    }

    pub fn with_file_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_file_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn page(&self) -> anyhow::Result<&Arc<dyn BrowserPage>> {
        self.page
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no browser page attached to the action context"))
    }

    pub fn is_file_allowed(&self, path: &str) -> bool {
        self.available_file_paths.iter().any(|p| p == path)
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret values never reach logs.
        let mut secret_keys: Vec<&String> = self.sensitive_data.keys().collect();
        secret_keys.sort();
        f.debug_struct("ActionContext")
            .field("page", &self.page.is_some())
            .field("extractor", &self.extractor.is_some())
            .field("sensitive_data", &secret_keys)
            .field("available_file_paths", &self.available_file_paths)
            .finish()
    }
}
