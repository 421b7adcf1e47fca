//! Default handlers for every action kind, driven through [`BrowserPage`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};
use url::Url;

use crate::action::*;
use crate::context::{ActionContext, ScrollDirection};
use crate::errors::ActionError;
use crate::registry::{ActionHandler, ActionRegistry, HandlerOutput};
use crate::result::{ActionResult, UserInputRequest};

static SECRET_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<secret>(.*?)</secret>").expect("secret placeholder pattern"));

const SEARCH_ENDPOINT: &str = "https://www.google.com/search";

/// Replace `<secret>name</secret>` placeholders with values from `secrets`.
/// Unknown names are left in place.
pub fn substitute_secrets(text: &str, secrets: &HashMap<String, String>) -> String {
    SECRET_PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let key = &caps[1];
            match secrets.get(key) {
                Some(value) => value.clone(),
                None => {
                    warn!(secret = key, "no value for secret placeholder");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

pub fn search_url(query: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(SEARCH_ENDPOINT, &[("q", query), ("udm", "14")])
}

/// Handler covering every built-in action kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserActions;

#[async_trait]
impl ActionHandler for BrowserActions {
    async fn call(&self, action: &Action, ctx: &ActionContext) -> anyhow::Result<HandlerOutput> {
        let output = match action {
            Action::GoToUrl(p) => {
                ctx.page()?.navigate(&p.url).await?;
                ActionResult::in_memory(format!("🔗 Navigated to {}", p.url))
            }
            Action::SearchGoogle(p) => {
                let url = search_url(&p.query)?;
                ctx.page()?.navigate(url.as_str()).await?;
                ActionResult::in_memory(format!("🔍 Searched for \"{}\" in Google", p.query))
            }
            Action::GoBack(_) => {
                ctx.page()?.go_back().await?;
                ActionResult::in_memory("🔙 Navigated back")
            }
            Action::Wait(p) => {
                tokio::time::sleep(Duration::from_secs(p.seconds)).await;
                ActionResult::in_memory(format!("🕒 Waited for {} seconds", p.seconds))
            }
            Action::ClickElement(p) => {
                ctx.page()?.click(p.index).await?;
                ActionResult::in_memory(format!("🖱️ Clicked element with index {}", p.index))
            }
            Action::InputText(p) => {
                let resolved = substitute_secrets(&p.text, &ctx.sensitive_data);
                ctx.page()?.type_text(p.index, &resolved).await?;
                // Report the placeholder form so secrets never reach memory.
                ActionResult::in_memory(format!("⌨️ Input {} into index {}", p.text, p.index))
            }
            Action::UploadFile(p) => {
                if !ctx.is_file_allowed(&p.path) {
                    return Ok(ActionResult::error(format!(
                        "File path {} is not available",
                        p.path
                    ))
                    .into());
                }
                ctx.page()?.upload_file(p.index, &p.path).await?;
                ActionResult::in_memory(format!(
                    "📁 Uploaded file {} to element {}",
                    p.path, p.index
                ))
            }
            Action::SwitchTab(p) => {
                ctx.page()?.switch_tab(p.page_id).await?;
                ActionResult::in_memory(format!("🔄 Switched to tab {}", p.page_id))
            }
            Action::OpenTab(p) => {
                ctx.page()?.open_tab(&p.url).await?;
                ActionResult::in_memory(format!("🔗 Opened new tab with {}", p.url))
            }
            Action::CloseTab(p) => {
                ctx.page()?.close_tab(p.page_id).await?;
                ActionResult::in_memory(format!("❌ Closed tab {}", p.page_id))
            }
            Action::ExtractContent(p) => {
                let content = ctx.page()?.content().await?;
                let extracted = match &ctx.extractor {
                    Some(extractor) => extractor.extract(&p.goal, &content).await?,
                    None => content,
                };
                ActionResult::in_memory(format!("📄 Extracted from page\n: {extracted}\n"))
            }
            Action::ScrollDown(p) => {
                ctx.page()?.scroll(ScrollDirection::Down, p.amount).await?;
                ActionResult::in_memory(scroll_message("down", p.amount))
            }
            Action::ScrollUp(p) => {
                ctx.page()?.scroll(ScrollDirection::Up, p.amount).await?;
                ActionResult::in_memory(scroll_message("up", p.amount))
            }
            Action::SendKeys(p) => {
                ctx.page()?.send_keys(&p.keys).await?;
                ActionResult::in_memory(format!("⌨️ Sent keys: {}", p.keys))
            }
            Action::ScrollToText(p) => {
                if ctx.page()?.scroll_to_text(&p.text).await? {
                    ActionResult::in_memory(format!("🔍 Scrolled to text: {}", p.text))
                } else {
                    ActionResult::in_memory(format!(
                        "Text '{}' not found or not visible on page",
                        p.text
                    ))
                }
            }
            Action::SelectDropdownOption(p) => {
                ctx.page()?.select_option(p.index, &p.text).await?;
                ActionResult::in_memory(format!(
                    "Selected option {} in dropdown {}",
                    p.text, p.index
                ))
            }
            Action::AskHuman(p) => ActionResult::user_input(UserInputRequest {
                prompt: p.question.clone(),
                input_type: p.input_type.clone().unwrap_or_else(|| "text".to_string()),
                options: p.options.clone().unwrap_or_default(),
            }),
            Action::Done(p) => ActionResult::done(p.text.clone(), p.success),
        };
        debug!(action = action.name(), "builtin handler finished");
        Ok(output.into())
    }
}

fn scroll_message(direction: &str, amount: Option<u32>) -> String {
    match amount {
        Some(pixels) => format!("🔍 Scrolled {direction} the page by {pixels} pixels"),
        None => format!("🔍 Scrolled {direction} the page by one page"),
    }
}

/// Register [`BrowserActions`] for every action kind.
pub fn register_browser_actions(registry: &mut ActionRegistry) -> Result<(), ActionError> {
    let handler: Arc<dyn ActionHandler> = Arc::new(BrowserActions);
    let h = || Arc::clone(&handler);

    registry.register_action::<GoToUrlParams>("go_to_url", "Navigate to URL in the current tab", h())?;
    registry.register_action::<SearchGoogleParams>(
        "search_google",
        "Search the query in Google in the current tab",
        h(),
    )?;
    registry.register_action::<NoParams>("go_back", "Go back to the previous page", h())?;
    registry.register_action::<WaitParams>("wait", "Wait for x seconds, default 3", h())?;
    registry.register_action::<ClickElementParams>("click_element", "Click element by index", h())?;
    registry.register_action::<InputTextParams>(
        "input_text",
        "Input text into an interactive element",
        h(),
    )?;
    registry.register_action::<UploadFileParams>(
        "upload_file",
        "Upload an allowed file to a file input element",
        h(),
    )?;
    registry.register_action::<TabParams>("switch_tab", "Switch to a tab by page id", h())?;
    registry.register_action::<OpenTabParams>("open_tab", "Open a URL in a new tab", h())?;
    registry.register_action::<TabParams>("close_tab", "Close a tab by page id", h())?;
    registry.register_action::<ExtractContentParams>(
        "extract_content",
        "Extract page content for a specific goal",
        h(),
    )?;
    registry.register_action::<ScrollParams>(
        "scroll_down",
        "Scroll down by pixel amount, one page if omitted",
        h(),
    )?;
    registry.register_action::<ScrollParams>(
        "scroll_up",
        "Scroll up by pixel amount, one page if omitted",
        h(),
    )?;
    registry.register_action::<SendKeysParams>(
        "send_keys",
        "Send special keys or shortcuts such as Escape or Control+o",
        h(),
    )?;
    registry.register_action::<ScrollToTextParams>(
        "scroll_to_text",
        "Scroll until the given text is visible",
        h(),
    )?;
    registry.register_action::<SelectDropdownOptionParams>(
        "select_dropdown_option",
        "Select a dropdown option by its visible text",
        h(),
    )?;
    registry.register_action::<AskHumanParams>(
        "ask_human",
        "Ask the user for input and pause until it arrives",
        h(),
    )?;
    registry.register_action::<DoneParams>("done", "Complete the task with a final answer", h())?;
    Ok(())
}

/// A registry with every built-in action registered.
pub fn default_registry() -> Result<ActionRegistry, ActionError> {
    let mut registry = ActionRegistry::new();
    register_browser_actions(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_substituted() {
        let mut secrets = HashMap::new();
        secrets.insert("password".to_string(), "hunter2".to_string());
        let text = substitute_secrets("<secret>password</secret> and <secret>pin</secret>", &secrets);
        assert_eq!(text, "hunter2 and <secret>pin</secret>");
    }

    #[test]
    fn search_url_is_encoded() {
        let url = search_url("rust async & more").unwrap();
        assert_eq!(url.host_str(), Some("www.google.com"));
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(query[0], ("q".to_string(), "rust async & more".to_string()));
    }

    #[test]
    fn default_registry_covers_every_action() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), Action::NAMES.len());
        for name in Action::NAMES {
            assert!(registry.contains(name), "missing {name}");
        }
    }
}
