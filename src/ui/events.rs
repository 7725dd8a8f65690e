use crate::ui::app::{App, AppMode};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// What a key press did to the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Chosen(String),
    Cancelled,
}

pub async fn event_loop(tx: mpsc::Sender<AppEvent>) {
    use crossterm::event::EventStream;

    let mut event_stream = EventStream::new();
    let mut tick_interval = tokio::time::interval(std::time::Duration::from_millis(250));

    loop {
        tokio::select! {
            maybe_event = event_stream.next() => {
                let event = match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => AppEvent::Key(key),
                    Some(Ok(Event::Resize(_, _))) => AppEvent::Resize,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => break,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            _ = tick_interval.tick() => {
                if tx.send(AppEvent::Tick).await.is_err() {
                    break;
                }
            }
        }
    }
}

pub fn handle_key_event(app: &mut App, key: KeyEvent) -> KeyOutcome {
    if let (KeyCode::Char('c'), KeyModifiers::CONTROL) = (key.code, key.modifiers) {
        return KeyOutcome::Cancelled;
    }
    match app.mode {
        AppMode::Picking => handle_picking_mode(app, key),
        AppMode::Help => handle_help_mode(app, key),
        // Automatic choices are not interactive.
        AppMode::AutoPicking(_) => KeyOutcome::Continue,
    }
}

fn handle_picking_mode(app: &mut App, key: KeyEvent) -> KeyOutcome {
    match key.code {
        KeyCode::Esc => return KeyOutcome::Cancelled,
        KeyCode::Enter => {
            if let Some(choice) = app.selected() {
                return KeyOutcome::Chosen(choice);
            }
        }
        KeyCode::F(1) => app.mode = AppMode::Help,
        KeyCode::Up => app.select_previous(),
        KeyCode::Down | KeyCode::Tab => app.select_next(),
        KeyCode::Home => app.select_first(),
        KeyCode::End => app.select_last(),
        KeyCode::Backspace => app.pop_filter(),
        KeyCode::Char(c) => app.push_filter(c),
        _ => {}
    }
    KeyOutcome::Continue
}

fn handle_help_mode(app: &mut App, _key: KeyEvent) -> KeyOutcome {
    app.mode = AppMode::Picking;
    KeyOutcome::Continue
}
