//! Scenario replay against the demo page
//!
//! A scenario is a JSON file with a list of steps:
//!
//! ```json
//! {
//!   "name": "pick lviv",
//!   "steps": [
//!     { "action": "click", "picker": 0 },
//!     { "action": "input", "text": "lv" },
//!     { "action": "wait", "ms": 200 },
//!     { "action": "assert_options", "picker": 0, "labels": ["Lviv"] },
//!     { "action": "key", "key": "ArrowDown" },
//!     { "action": "key", "key": "Enter" },
//!     { "action": "assert_selected", "picker": 0, "label": "Lviv" }
//!   ]
//! }
//! ```
//!
//! Steps run in order until one fails. Time only moves on `wait`.

use std::time::Duration;

use selecta_cn::prelude::*;
use selecta_core::{Modifiers, PageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::demo::{DemoPage, Snapshot};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Click a picker's trigger
    Click { picker: usize },
    /// Click the option row at `index` of an open picker
    ClickOption { picker: usize, index: usize },
    HoverOption { picker: usize, index: usize },
    /// Key press on the focused node, by DOM key name ("ArrowDown", "Enter", " ")
    Key { key: String },
    /// Replace the value of the focused search field
    Input { text: String },
    Tab {
        #[serde(default)]
        shift: bool,
    },
    /// Pointer press on the page background
    PointerDownOutside,
    /// Advance the virtual clock
    Wait { ms: u64 },
    AssertOpen { picker: usize, open: bool },
    /// `label: null` asserts there is no selection
    AssertSelected { picker: usize, label: Option<String> },
    /// Labels of the visible option rows, in order
    AssertOptions { picker: usize, labels: Vec<String> },
    /// Record the page state in the report
    Snapshot,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("there is no picker {0}")]
    UnknownPicker(usize),
    #[error("picker {picker} shows no option {index}")]
    NoOption { picker: usize, index: usize },
    #[error("unknown key name {0:?}")]
    UnknownKey(String),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: String,
    pub status: Status,
    pub steps_run: usize,
    /// Index of the step that failed
    pub failed_step: Option<usize>,
    pub message: Option<String>,
    /// Virtual time spent
    pub elapsed_ms: u64,
    pub snapshots: Vec<Snapshot>,
}

impl Report {
    pub fn is_passed(&self) -> bool {
        self.status == Status::Passed
    }

    pub fn print_summary(&self) {
        match (self.status, self.failed_step) {
            (Status::Passed, _) => println!(
                "✓ {} ({} steps, {} ms)",
                self.scenario, self.steps_run, self.elapsed_ms
            ),
            (Status::Failed, step) => {
                println!("✗ {}", self.scenario);
                if let Some(step) = step {
                    println!("  step {step}: {}", self.message.as_deref().unwrap_or("failed"));
                }
            }
        }
    }
}

/// Replay `scenario` on a freshly mounted demo page
pub fn run(scenario: &Scenario, settings: &ComboboxSettings) -> Result<Report, PageError> {
    let demo = DemoPage::mount(settings)?;
    let mut report = Report {
        scenario: scenario.name.clone(),
        status: Status::Passed,
        steps_run: 0,
        failed_step: None,
        message: None,
        elapsed_ms: 0,
        snapshots: Vec::new(),
    };

    info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(index, ?step, "step");
        report.steps_run += 1;
        match apply(&demo, step) {
            Ok(Some(snapshot)) => report.snapshots.push(snapshot),
            Ok(None) => {}
            Err(err) => {
                report.status = Status::Failed;
                report.failed_step = Some(index);
                report.message = Some(err.to_string());
                break;
            }
        }
    }

    report.elapsed_ms = demo.page().scheduler().now_ms();
    Ok(report)
}

fn apply(demo: &DemoPage, step: &Step) -> Result<Option<Snapshot>, StepError> {
    let page = demo.page();
    let picker = |index: usize| demo.picker(index).ok_or(StepError::UnknownPicker(index));
    let option = |index: usize, option: usize| {
        picker(index)?
            .option_node(option)
            .ok_or(StepError::NoOption {
                picker: index,
                index: option,
            })
    };

    match step {
        Step::Click { picker: index } => page.click(picker(*index)?.trigger_node())?,
        Step::ClickOption { picker, index } => page.click(option(*picker, *index)?)?,
        Step::HoverOption { picker, index } => page.hover(option(*picker, *index)?)?,
        Step::Key { key } => {
            let code = KeyCode::from_name(key).ok_or_else(|| StepError::UnknownKey(key.clone()))?;
            page.key_down(code);
        }
        Step::Input { text } => page.input(text)?,
        Step::Tab { shift } => page.key_down_with(KeyCode::TAB, Modifiers::new(*shift, false, false, false)),
        Step::PointerDownOutside => page.pointer_down(demo.backdrop())?,
        Step::Wait { ms } => page.advance(Duration::from_millis(*ms)),
        Step::AssertOpen { picker: index, open } => {
            let actual = picker(*index)?.is_open();
            if actual != *open {
                return Err(StepError::Assertion(format!(
                    "picker {index} open = {actual}, expected {open}"
                )));
            }
        }
        Step::AssertSelected { picker: index, label } => {
            let actual = picker(*index)?.value().map(|city| city.name.clone());
            if actual != *label {
                return Err(StepError::Assertion(format!(
                    "picker {index} selected {actual:?}, expected {label:?}"
                )));
            }
        }
        Step::AssertOptions { picker: index, labels } => {
            let view = picker(*index)?.view();
            let actual = view.labels();
            if actual != *labels {
                return Err(StepError::Assertion(format!(
                    "picker {index} shows {actual:?}, expected {labels:?}"
                )));
            }
        }
        Step::Snapshot => return Ok(Some(demo.snapshot())),
    }
    Ok(None)
}
