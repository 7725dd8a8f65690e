use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, StatefulWidget, Widget},
};

/// `[2/4] Pick namespace`
pub struct StepHeader<'a> {
    step: usize,
    total_steps: usize,
    title: &'a str,
}

impl<'a> StepHeader<'a> {
    pub fn new(step: usize, total_steps: usize, title: &'a str) -> Self {
        Self {
            step,
            total_steps,
            title,
        }
    }
}

impl Widget for StepHeader<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = Line::from(vec![
            Span::styled(
                format!("[{}/{}] ", self.step, self.total_steps),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(
                self.title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
        ]);
        Paragraph::new(line).render(area, buf);
    }
}

pub struct FilterBar<'a> {
    pattern: &'a str,
    placeholder: &'a str,
}

impl<'a> FilterBar<'a> {
    pub fn new(pattern: &'a str, placeholder: &'a str) -> Self {
        Self {
            pattern,
            placeholder,
        }
    }
}

impl Widget for FilterBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let text = if self.pattern.is_empty() {
            Span::styled(self.placeholder, Style::default().fg(Color::DarkGray))
        } else {
            Span::styled(format!("{}_", self.pattern), Style::default().fg(Color::Yellow))
        };
        Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Filter"))
            .alignment(Alignment::Left)
            .render(area, buf);
    }
}

/// The candidate names, with the highlighted one marked.
pub struct ItemList<'a> {
    items: Vec<&'a str>,
    auto_choice: Option<&'a str>,
}

impl<'a> ItemList<'a> {
    pub fn new(items: Vec<&'a str>, auto_choice: Option<&'a str>) -> Self {
        Self { items, auto_choice }
    }
}

impl StatefulWidget for ItemList<'_> {
    type State = ListState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let title = match self.auto_choice {
            Some(choice) => format!("Auto-selecting {} ...", choice),
            None => format!("{} items", self.items.len()),
        };
        let block = Block::default().borders(Borders::ALL).title(title);

        if self.items.is_empty() {
            Paragraph::new(Span::styled(
                "No items. Press Esc to cancel.",
                Style::default().fg(Color::DarkGray),
            ))
            .block(block)
            .render(area, buf);
            return;
        }

        let items: Vec<ListItem> = self.items.into_iter().map(ListItem::new).collect();
        let highlight = if self.auto_choice.is_some() {
            Style::default().fg(Color::Black).bg(Color::Green)
        } else {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        };
        let list = List::new(items)
            .block(block)
            .highlight_style(highlight)
            .highlight_symbol("> ");
        StatefulWidget::render(list, area, buf, state);
    }
}

pub struct StatusBar {
    shown: usize,
    total: usize,
    auto_picking: bool,
}

impl StatusBar {
    pub fn new(shown: usize, total: usize, auto_picking: bool) -> Self {
        Self {
            shown,
            total,
            auto_picking,
        }
    }
}

impl Widget for StatusBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let status_text = if self.auto_picking {
            "Selecting automatically".to_string()
        } else {
            format!(
                "{}/{} shown | ↑/↓ move | Enter select | Esc cancel | F1 help",
                self.shown, self.total
            )
        };
        Paragraph::new(status_text)
            .style(Style::default().bg(Color::DarkGray).fg(Color::White))
            .render(area, buf);
    }
}

pub struct HelpOverlay;

impl Widget for HelpOverlay {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let help_lines = [
            "Keyboard Shortcuts",
            "",
            "  type        - Filter the list",
            "  Backspace   - Delete filter character",
            "  ↑/↓, Tab    - Move selection",
            "  Home/End    - First/last item",
            "  Enter       - Select",
            "  Esc/Ctrl-C  - Cancel the wizard",
            "",
            "Press any key to close",
        ];
        let lines: Vec<Line> = help_lines.iter().map(|s| Line::from(*s)).collect();

        let help_width = 44;
        let help_height = help_lines.len() as u16 + 2;
        let x = (area.width.saturating_sub(help_width)) / 2;
        let y = (area.height.saturating_sub(help_height)) / 2;
        let help_area = Rect {
            x: area.x + x,
            y: area.y + y,
            width: help_width.min(area.width),
            height: help_height.min(area.height),
        };

        Clear.render(help_area, buf);
        Paragraph::new(lines)
            .block(Block::default().title("Help").borders(Borders::ALL))
            .style(Style::default().bg(Color::Black).fg(Color::White))
            .render(help_area, buf);
    }
}
