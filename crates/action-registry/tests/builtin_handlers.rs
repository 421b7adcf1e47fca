use std::collections::HashMap;
use std::sync::Arc;

use action_registry::{
    default_registry, Action, ActionContext, ActionError, BrowserPage, PageExtractor,
    ScrollDirection,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

#[derive(Default)]
struct RecordingPage {
    calls: Mutex<Vec<String>>,
}

impl RecordingPage {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl BrowserPage for RecordingPage {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.record(format!("navigate {url}"));
        Ok(())
    }
    async fn go_back(&self) -> anyhow::Result<()> {
        self.record("back".into());
        Ok(())
    }
    async fn click(&self, index: u32) -> anyhow::Result<()> {
        if index == 99 {
            anyhow::bail!("element 99 is not clickable");
        }
        self.record(format!("click {index}"));
        Ok(())
    }
    async fn type_text(&self, index: u32, text: &str) -> anyhow::Result<()> {
        self.record(format!("type {index} {text}"));
        Ok(())
    }
    async fn upload_file(&self, index: u32, path: &str) -> anyhow::Result<()> {
        self.record(format!("upload {index} {path}"));
        Ok(())
    }
    async fn switch_tab(&self, page_id: u32) -> anyhow::Result<()> {
        self.record(format!("switch {page_id}"));
        Ok(())
    }
    async fn open_tab(&self, url: &str) -> anyhow::Result<()> {
        self.record(format!("open {url}"));
        Ok(())
    }
    async fn close_tab(&self, page_id: u32) -> anyhow::Result<()> {
        self.record(format!("close {page_id}"));
        Ok(())
    }
    async fn scroll(&self, direction: ScrollDirection, amount: Option<u32>) -> anyhow::Result<()> {
        self.record(format!("scroll {direction:?} {amount:?}"));
        Ok(())
    }
    async fn send_keys(&self, keys: &str) -> anyhow::Result<()> {
        self.record(format!("keys {keys}"));
        Ok(())
    }
    async fn scroll_to_text(&self, text: &str) -> anyhow::Result<bool> {
        Ok(text == "Pricing")
    }
    async fn select_option(&self, index: u32, text: &str) -> anyhow::Result<()> {
        self.record(format!("select {index} {text}"));
        Ok(())
    }
    async fn content(&self) -> anyhow::Result<String> {
        Ok("# Title\nprice: 42".into())
    }
}

struct UppercaseExtractor;

#[async_trait]
impl PageExtractor for UppercaseExtractor {
    async fn extract(&self, goal: &str, content: &str) -> anyhow::Result<String> {
        Ok(format!("{goal}: {}", content.to_uppercase()))
    }
}

fn context(page: &Arc<RecordingPage>) -> ActionContext {
    let mut secrets = HashMap::new();
    secrets.insert("password".to_string(), "hunter2".to_string());
    ActionContext::new()
        .with_page(page.clone())
        .with_extractor(Arc::new(UppercaseExtractor))
        .with_sensitive_data(secrets)
        .with_file_paths(["/tmp/resume.pdf"])
}

#[tokio::test]
async fn navigation_and_input_reach_the_driver() {
    let registry = default_registry().unwrap();
    let page = Arc::new(RecordingPage::default());
    let ctx = context(&page);

    registry
        .execute_json(&json!({ "go_to_url": { "url": "https://example.com" } }), &ctx)
        .await
        .unwrap();
    let typed = registry
        .execute(&Action::input_text(3, "<secret>password</secret>"), &ctx)
        .await
        .unwrap();
    registry
        .execute_json(&json!({ "scroll_down": {} }), &ctx)
        .await
        .unwrap();

    assert_eq!(
        page.calls(),
        vec![
            "navigate https://example.com".to_string(),
            "type 3 hunter2".to_string(),
            "scroll Down None".to_string(),
        ]
    );
    let memory = typed.extracted_content.unwrap();
    assert!(!memory.contains("hunter2"));
    assert!(typed.include_in_memory);
}

#[tokio::test]
async fn upload_outside_allowlist_is_reported_not_executed() {
    let registry = default_registry().unwrap();
    let page = Arc::new(RecordingPage::default());
    let ctx = context(&page);

    let denied = registry
        .execute_json(&json!({ "upload_file": { "index": 1, "path": "/etc/passwd" } }), &ctx)
        .await
        .unwrap();
    assert!(denied.has_error());

    let allowed = registry
        .execute_json(&json!({ "upload_file": { "index": 1, "path": "/tmp/resume.pdf" } }), &ctx)
        .await
        .unwrap();
    assert!(!allowed.has_error());
    assert_eq!(page.calls(), vec!["upload 1 /tmp/resume.pdf".to_string()]);
}

#[tokio::test]
async fn extraction_uses_the_injected_extractor() {
    let registry = default_registry().unwrap();
    let page = Arc::new(RecordingPage::default());
    let result = registry
        .execute(&Action::extract("price"), &context(&page))
        .await
        .unwrap();
    assert!(result.extracted_content.unwrap().contains("PRICE: 42"));
}

#[tokio::test]
async fn done_and_ask_human_are_terminal() {
    let registry = default_registry().unwrap();
    let ctx = ActionContext::new();

    let done = registry
        .execute_json(&json!({ "done": { "text": "finished", "success": false } }), &ctx)
        .await
        .unwrap();
    assert!(done.is_done);
    assert_eq!(done.success, Some(false));

    let ask = registry
        .execute_json(
            &json!({ "ask_human": { "question": "2FA code?", "options": ["sms", "app"] } }),
            &ctx,
        )
        .await
        .unwrap();
    assert!(ask.requires_user_action);
    let request = ask.user_input_request.unwrap();
    assert_eq!(request.input_type, "text");
    assert_eq!(request.options, vec!["sms".to_string(), "app".to_string()]);
}

#[tokio::test]
async fn driver_failures_surface_as_handler_errors() {
    let registry = default_registry().unwrap();
    let page = Arc::new(RecordingPage::default());
    let err = registry
        .execute(&Action::click(99), &context(&page))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Handler(_)));
    assert!(err.to_string().contains("not clickable"));

    let err = registry
        .execute(&Action::click(1), &ActionContext::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no browser page"));
}

#[tokio::test]
async fn scroll_to_missing_text_is_not_an_error() {
    let registry = default_registry().unwrap();
    let page = Arc::new(RecordingPage::default());
    let result = registry
        .execute_json(&json!({ "scroll_to_text": { "text": "Careers" } }), &context(&page))
        .await
        .unwrap();
    assert!(!result.has_error());
    assert!(result.extracted_content.unwrap().contains("not found"));
}
