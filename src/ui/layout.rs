use ratatui::layout::{Constraint, Direction, Layout, Rect};

pub struct AppLayout {
    pub header: Rect,
    pub filter: Rect,
    pub list: Rect,
    pub status_bar: Rect,
}

pub fn create_layout(area: Rect) -> AppLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Step title
            Constraint::Length(3), // Filter input
            Constraint::Min(1),    // Items
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    AppLayout {
        header: chunks[0],
        filter: chunks[1],
        list: chunks[2],
        status_bar: chunks[3],
    }
}
