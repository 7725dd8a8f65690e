use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::types::Stage;

/// What a single wizard step presents to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOptions {
    pub stage: Stage,
    pub step: usize,
    pub total_steps: usize,
    pub title: String,
    pub placeholder: String,
    pub items: Vec<String>,
    pub auto_pick_on_single_item: bool,
    pub auto_select_on_name: Option<String>,
}

impl PickOptions {
    pub fn for_stage(stage: Stage, items: Vec<String>) -> Self {
        Self {
            stage,
            step: stage.step(),
            total_steps: Stage::ALL.len(),
            title: stage.title().to_string(),
            placeholder: format!("Pick {}...", stage),
            items,
            auto_pick_on_single_item: false,
            auto_select_on_name: None,
        }
    }

    /// The item to commit without user input, if any. A preferred name that
    /// matches a candidate wins over the single-candidate rule; a preferred
    /// name absent from the candidates falls through to it.
    pub fn auto_choice(&self) -> Option<&str> {
        if let Some(preferred) = &self.auto_select_on_name
            && let Some(item) = self.items.iter().find(|i| *i == preferred)
        {
            return Some(item);
        }
        if self.auto_pick_on_single_item && self.items.len() == 1 {
            return Some(&self.items[0]);
        }
        None
    }
}

#[async_trait]
pub trait Picker: Send + Sync {
    /// Let the user choose one of `options.items`. `None` means the picker
    /// was closed without a choice.
    async fn show(&self, options: &PickOptions) -> Option<String>;

    /// Make an automatic choice visible for `delay` before it is committed.
    async fn preview_auto_pick(&self, options: &PickOptions, choice: &str, delay: Duration) {
        let _ = (options, choice);
        tokio::time::sleep(delay).await;
    }
}

/// Numbered-list prompt on stderr/stdin, for terminals without the TUI.
pub struct PromptPicker;

impl PromptPicker {
    fn render(options: &PickOptions) -> String {
        let mut out = format!(
            "[{}/{}] {}\n",
            options.step, options.total_steps, options.title
        );
        if options.items.is_empty() {
            out.push_str("  (no items)\n");
        }
        for (i, item) in options.items.iter().enumerate() {
            out.push_str(&format!("  {:>2}) {}\n", i + 1, item));
        }
        out.push_str(&format!("{} (number or name, empty to cancel): ", options.placeholder));
        out
    }

    /// Map a typed answer to an item: a 1-based index or an exact name.
    fn parse_answer(options: &PickOptions, answer: &str) -> Option<String> {
        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }
        if let Ok(index) = answer.parse::<usize>()
            && index >= 1
        {
            return options.items.get(index - 1).cloned();
        }
        options.items.iter().find(|i| *i == answer).cloned()
    }
}

#[async_trait]
impl Picker for PromptPicker {
    async fn show(&self, options: &PickOptions) -> Option<String> {
        let mut stderr = tokio::io::stderr();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            stderr
                .write_all(Self::render(options).as_bytes())
                .await
                .ok()?;
            stderr.flush().await.ok()?;

            let line = lines.next_line().await.ok()??;
            if line.trim().is_empty() {
                return None;
            }
            match Self::parse_answer(options, &line) {
                Some(choice) => return Some(choice),
                None => {
                    let _ = stderr
                        .write_all(format!("'{}' is not one of the choices\n", line.trim()).as_bytes())
                        .await;
                }
            }
        }
    }

    async fn preview_auto_pick(&self, options: &PickOptions, choice: &str, delay: Duration) {
        eprintln!(
            "[{}/{}] {}: auto-selecting {} ...",
            options.step, options.total_steps, options.title, choice
        );
        tokio::time::sleep(delay).await;
    }
}
