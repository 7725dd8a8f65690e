use crate::picker::PickOptions;
use ratatui::widgets::ListState;

#[derive(Debug, Clone, PartialEq)]
pub enum AppMode {
    /// Waiting for the user to choose.
    Picking,
    /// Showing an automatic choice before it is committed.
    AutoPicking(String),
    Help,
}

/// State of one picker step.
pub struct App {
    pub options: PickOptions,
    pub filter_pattern: String,
    pub list_state: ListState,
    pub mode: AppMode,
    // Indexes into options.items that match the filter
    visible: Vec<usize>,
}

impl App {
    pub fn new(options: PickOptions) -> Self {
        let mut app = Self {
            options,
            filter_pattern: String::new(),
            list_state: ListState::default(),
            mode: AppMode::Picking,
            visible: Vec::new(),
        };
        app.refilter();
        app
    }

    pub fn auto_picking(options: PickOptions, choice: &str) -> Self {
        let mut app = Self::new(options);
        if let Some(pos) = app
            .visible
            .iter()
            .position(|&i| app.options.items[i] == choice)
        {
            app.list_state.select(Some(pos));
        }
        app.mode = AppMode::AutoPicking(choice.to_string());
        app
    }

    pub fn visible_items(&self) -> Vec<&str> {
        self.visible
            .iter()
            .map(|&i| self.options.items[i].as_str())
            .collect()
    }

    pub fn selected(&self) -> Option<String> {
        let pos = self.list_state.selected()?;
        self.visible
            .get(pos)
            .map(|&i| self.options.items[i].clone())
    }

    pub fn select_next(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) if i + 1 < self.visible.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let prev = match self.list_state.selected() {
            Some(0) | None => self.visible.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(prev));
    }

    pub fn select_first(&mut self) {
        if !self.visible.is_empty() {
            self.list_state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        if !self.visible.is_empty() {
            self.list_state.select(Some(self.visible.len() - 1));
        }
    }

    pub fn push_filter(&mut self, c: char) {
        self.filter_pattern.push(c);
        self.refilter();
    }

    pub fn pop_filter(&mut self) {
        self.filter_pattern.pop();
        self.refilter();
    }

    /// Case-insensitive substring match; keeps the first match selected.
    fn refilter(&mut self) {
        let needle = self.filter_pattern.to_lowercase();
        self.visible = self
            .options
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| needle.is_empty() || item.to_lowercase().contains(&needle))
            .map(|(i, _)| i)
            .collect();
        self.list_state
            .select(if self.visible.is_empty() { None } else { Some(0) });
    }
}
