//! Closed action model.
//!
//! Wire shape is `{"<action_name>": {<params>}}` with exactly one top-level
//! key. Parameter structs reject unknown fields so a malformed LLM proposal
//! fails validation instead of being silently reinterpreted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ActionError;

/// Actions that carry no parameters still accept `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GoToUrlParams {
    /// Absolute URL to open in the current tab.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchGoogleParams {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WaitParams {
    /// Seconds to wait. Default: 3
    #[serde(default = "default_wait_seconds")]
    pub seconds: u64,
}

fn default_wait_seconds() -> u64 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ClickElementParams {
    /// Element index from the current snapshot's selector map.
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InputTextParams {
    pub index: u32,
    /// Text to type. `<secret>name</secret>` placeholders are resolved from the
    /// sensitive-data map at execution time.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UploadFileParams {
    pub index: u32,
    /// Must be one of the allowlisted file paths.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TabParams {
    pub page_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OpenTabParams {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractContentParams {
    /// What to extract from the page.
    pub goal: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ScrollParams {
    /// Pixels to scroll; one viewport when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SendKeysParams {
    /// Key chord such as `Enter` or `Control+a`.
    pub keys: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ScrollToTextParams {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SelectDropdownOptionParams {
    pub index: u32,
    /// Visible option text to select.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AskHumanParams {
    pub question: String,
    /// Input widget hint: `text`, `confirm`, `choice`. Default: `text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DoneParams {
    pub text: String,
    #[serde(default = "default_done_success")]
    pub success: bool,
}

fn default_done_success() -> bool {
    true
}

/// One proposed browser action. Exactly one variant per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GoToUrl(GoToUrlParams),
    SearchGoogle(SearchGoogleParams),
    GoBack(NoParams),
    Wait(WaitParams),
    ClickElement(ClickElementParams),
    InputText(InputTextParams),
    UploadFile(UploadFileParams),
    SwitchTab(TabParams),
    OpenTab(OpenTabParams),
    CloseTab(TabParams),
    ExtractContent(ExtractContentParams),
    ScrollDown(ScrollParams),
    ScrollUp(ScrollParams),
    SendKeys(SendKeysParams),
    ScrollToText(ScrollToTextParams),
    SelectDropdownOption(SelectDropdownOptionParams),
    AskHuman(AskHumanParams),
    Done(DoneParams),
}

impl Action {
    /// Every action name in wire form.
    pub const NAMES: &'static [&'static str] = &[
        "go_to_url",
        "search_google",
        "go_back",
        "wait",
        "click_element",
        "input_text",
        "upload_file",
        "switch_tab",
        "open_tab",
        "close_tab",
        "extract_content",
        "scroll_down",
        "scroll_up",
        "send_keys",
        "scroll_to_text",
        "select_dropdown_option",
        "ask_human",
        "done",
    ];

    pub fn is_known_name(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::GoToUrl(_) => "go_to_url",
            Action::SearchGoogle(_) => "search_google",
            Action::GoBack(_) => "go_back",
            Action::Wait(_) => "wait",
            Action::ClickElement(_) => "click_element",
            Action::InputText(_) => "input_text",
            Action::UploadFile(_) => "upload_file",
            Action::SwitchTab(_) => "switch_tab",
            Action::OpenTab(_) => "open_tab",
            Action::CloseTab(_) => "close_tab",
            Action::ExtractContent(_) => "extract_content",
            Action::ScrollDown(_) => "scroll_down",
            Action::ScrollUp(_) => "scroll_up",
            Action::SendKeys(_) => "send_keys",
            Action::ScrollToText(_) => "scroll_to_text",
            Action::SelectDropdownOption(_) => "select_dropdown_option",
            Action::AskHuman(_) => "ask_human",
            Action::Done(_) => "done",
        }
    }

    /// Element index for index-addressed actions.
    pub fn index(&self) -> Option<u32> {
        match self {
            Action::ClickElement(p) => Some(p.index),
            Action::InputText(p) => Some(p.index),
            Action::UploadFile(p) => Some(p.index),
            Action::SelectDropdownOption(p) => Some(p.index),
            _ => None,
        }
    }

    pub fn is_index_addressed(&self) -> bool {
        self.index().is_some()
    }

    /// Actions that neither address elements nor mutate the DOM, and may
    /// therefore share a parallel batch.
    pub fn is_parallel_safe(&self) -> bool {
        matches!(self, Action::ExtractContent(_) | Action::Wait(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done(_))
    }

    pub fn click(index: u32) -> Self {
        Action::ClickElement(ClickElementParams { index, xpath: None })
    }

    pub fn input_text(index: u32, text: impl Into<String>) -> Self {
        Action::InputText(InputTextParams {
            index,
            text: text.into(),
            xpath: None,
        })
    }

    pub fn go_to_url(url: impl Into<String>) -> Self {
        Action::GoToUrl(GoToUrlParams { url: url.into() })
    }

    pub fn wait(seconds: u64) -> Self {
        Action::Wait(WaitParams { seconds })
    }

    pub fn extract(goal: impl Into<String>) -> Self {
        Action::ExtractContent(ExtractContentParams { goal: goal.into() })
    }

    pub fn done(text: impl Into<String>) -> Self {
        Action::Done(DoneParams {
            text: text.into(),
            success: true,
        })
    }

    /// Parse `{"<action_name>": {<params>}}`.
    pub fn from_json(value: &Value) -> Result<Self, ActionError> {
        let object = value.as_object().ok_or_else(|| {
            ActionError::invalid_parameters("<unknown>", "action must be a JSON object")
        })?;
        if object.len() != 1 {
            return Err(ActionError::invalid_parameters(
                "<unknown>",
                format!(
                    "action must have exactly one top-level key, found {}",
                    object.len()
                ),
            ));
        }
        let name = object.keys().next().cloned().unwrap_or_default();
        if !Self::is_known_name(&name) {
            return Err(ActionError::UnknownAction(name));
        }
        let action: Action = serde_json::from_value(value.clone())
            .map_err(|err| ActionError::invalid_parameters(&name, err.to_string()))?;
        action.validate()?;
        Ok(action)
    }

    /// Parse a JSON array of actions.
    pub fn parse_plan(value: &Value) -> Result<Vec<Self>, ActionError> {
        let items = value.as_array().ok_or_else(|| {
            ActionError::invalid_parameters("<plan>", "plan must be a JSON array of actions")
        })?;
        items.iter().map(Self::from_json).collect()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ActionError> {
        let name = self.name();
        let require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(ActionError::invalid_parameters(
                    name,
                    format!("'{field}' must not be empty"),
                ))
            } else {
                Ok(())
            }
        };
        match self {
            Action::GoToUrl(p) => require("url", &p.url),
            Action::OpenTab(p) => require("url", &p.url),
            Action::SearchGoogle(p) => require("query", &p.query),
            Action::UploadFile(p) => require("path", &p.path),
            Action::ExtractContent(p) => require("goal", &p.goal),
            Action::SendKeys(p) => require("keys", &p.keys),
            Action::ScrollToText(p) => require("text", &p.text),
            Action::SelectDropdownOption(p) => require("text", &p.text),
            Action::AskHuman(p) => require("question", &p.question),
            Action::Wait(p) if p.seconds > 300 => Err(ActionError::invalid_parameters(
                name,
                "'seconds' must be at most 300",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_key_wire_shape() {
        let action = Action::from_json(&json!({ "click_element": { "index": 4 } })).unwrap();
        assert_eq!(action, Action::click(4));
        assert_eq!(action.index(), Some(4));
        assert_eq!(action.name(), "click_element");
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let value = Action::input_text(2, "hello").to_json();
        assert_eq!(value, json!({ "input_text": { "index": 2, "text": "hello" } }));
    }

    #[test]
    fn parameterless_actions_accept_empty_object() {
        let action = Action::from_json(&json!({ "go_back": {} })).unwrap();
        assert!(matches!(action, Action::GoBack(_)));
    }

    #[test]
    fn rejects_multiple_top_level_keys() {
        let err = Action::from_json(&json!({
            "click_element": { "index": 1 },
            "done": { "text": "x" }
        }))
        .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameters { .. }));
    }

    #[test]
    fn rejects_mismatched_payload() {
        let err = Action::from_json(&json!({ "click_element": { "index": "first" } })).unwrap_err();
        match err {
            ActionError::InvalidParameters { action, .. } => assert_eq!(action, "click_element"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = Action::from_json(&json!({ "go_to_url": { "url": "x", "extra": 1 } })).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameters { .. }));
    }

    #[test]
    fn rejects_unknown_action_names() {
        let err = Action::from_json(&json!({ "teleport": {} })).unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(name) if name == "teleport"));
    }

    #[test]
    fn semantic_validation_catches_empty_fields() {
        let err = Action::from_json(&json!({ "go_to_url": { "url": "  " } })).unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn defaults_are_applied() {
        let action = Action::from_json(&json!({ "wait": {} })).unwrap();
        assert_eq!(action, Action::wait(3));
        let done = Action::from_json(&json!({ "done": { "text": "ok" } })).unwrap();
        assert_eq!(done, Action::done("ok"));
    }

    #[test]
    fn parse_plan_stops_at_first_invalid_entry() {
        let plan = Action::parse_plan(&json!([
            { "click_element": { "index": 1 } },
            { "input_text": { "index": 2, "text": "hello" } }
        ]))
        .unwrap();
        assert_eq!(plan.len(), 2);

        assert!(Action::parse_plan(&json!([{ "click_element": {} }])).is_err());
        assert!(Action::parse_plan(&json!({ "click_element": { "index": 1 } })).is_err());
    }

    #[test]
    fn names_cover_every_variant() {
        for name in Action::NAMES {
            assert!(Action::is_known_name(name));
        }
        assert_eq!(Action::NAMES.len(), 18);
    }
}
