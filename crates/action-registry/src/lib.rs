//! Action model, name-to-handler registry and the built-in browser handlers.

pub mod action;
pub mod builtin;
pub mod context;
pub mod errors;
pub mod registry;
pub mod result;

pub use action::Action;
pub use builtin::{default_registry, register_browser_actions, BrowserActions};
pub use context::{ActionContext, BrowserPage, PageExtractor, ScrollDirection};
pub use errors::ActionError;
pub use registry::{
    handler_fn, ActionDescriptor, ActionHandler, ActionRegistry, FnHandler, HandlerOutput,
};
pub use result::{ActionResult, UserInputRequest};
