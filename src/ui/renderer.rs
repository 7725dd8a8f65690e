use crate::ui::app::{App, AppMode};
use crate::ui::layout::create_layout;
use crate::ui::widgets::{FilterBar, HelpOverlay, ItemList, StatusBar, StepHeader};
use ratatui::{Frame, Terminal, backend::Backend};

pub fn render<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> std::io::Result<()> {
    terminal.draw(|f| render_frame(f, app))?;
    Ok(())
}

fn render_frame(f: &mut Frame, app: &mut App) {
    let layout = create_layout(f.area());

    f.render_widget(
        StepHeader::new(app.options.step, app.options.total_steps, &app.options.title),
        layout.header,
    );
    f.render_widget(
        FilterBar::new(&app.filter_pattern, &app.options.placeholder),
        layout.filter,
    );

    let auto_choice = match &app.mode {
        AppMode::AutoPicking(choice) => Some(choice.as_str()),
        _ => None,
    };
    let items: Vec<String> = app.visible_items().into_iter().map(String::from).collect();
    let shown = items.len();
    f.render_stateful_widget(
        ItemList::new(items.iter().map(String::as_str).collect(), auto_choice),
        layout.list,
        &mut app.list_state,
    );
    f.render_widget(
        StatusBar::new(shown, app.options.items.len(), auto_choice.is_some()),
        layout.status_bar,
    );

    if app.mode == AppMode::Help {
        f.render_widget(HelpOverlay, f.area());
    }
}
