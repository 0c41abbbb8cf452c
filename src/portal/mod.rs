//! GST portal flows: locator tables and the workflow that drives them.

pub mod locators;
pub mod workflow;

pub use locators::PortalLocators;
pub use workflow::{plan, Step, Workflow, WorkflowFailure, WorkflowState};
