//! Prompt rendering for AI steps.

use crate::task::domain::Task;
use minijinja::{Environment, UndefinedBehavior, context};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TaskView<'a> {
    id: String,
    workspace: &'a str,
    template: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct StepView<'a> {
    name: &'a str,
    index: usize,
    attempt: u32,
}

/// Renders step prompt templates against the task.
///
/// Templates see `task` (`id`, `workspace`, `template`, `description`),
/// `step` (`name`, `index`, `attempt`), `previous_output` and
/// `last_error`. Referencing anything else is an error.
#[derive(Debug)]
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    /// Creates a renderer with strict undefined handling.
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Renders the prompt for the task's current step.
    ///
    /// Steps without a template get the task description.
    ///
    /// # Errors
    ///
    /// Returns [`minijinja::Error`] for malformed templates or unknown
    /// variables.
    pub fn render(&self, task: &Task, attempt: u32) -> Result<String, minijinja::Error> {
        let Some(step) = task.current() else {
            return Ok(task.description().to_owned());
        };
        let Some(template) = step.definition().prompt.as_deref() else {
            return Ok(task.description().to_owned());
        };
        let previous = task.step_results().last();
        self.env.render_str(
            template,
            context! {
                task => TaskView {
                    id: task.id().to_string(),
                    workspace: task.workspace().as_ref(),
                    template: task.template(),
                    description: task.description(),
                },
                step => StepView {
                    name: step.name(),
                    index: task.current_step(),
                    attempt,
                },
                previous_output => previous.map(|result| result.output.as_str()),
                last_error => step.error(),
            },
        )
    }
}
