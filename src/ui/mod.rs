//! Full-screen terminal picker.
//!
//! Each `show` takes over the terminal, runs its event loop in a spawned
//! task and reports the choice through a one-shot channel.

pub mod app;
pub mod events;
pub mod layout;
pub mod renderer;
pub mod widgets;

pub use app::App;
pub use events::AppEvent;

use async_trait::async_trait;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::Stdout;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::picker::{PickOptions, Picker};
use events::KeyOutcome;

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Restores the terminal when dropped, including on early returns.
struct TerminalSession {
    terminal: Term,
}

impl TerminalSession {
    fn start() -> std::io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

pub struct TuiPicker;

#[async_trait]
impl Picker for TuiPicker {
    async fn show(&self, options: &PickOptions) -> Option<String> {
        let (result_tx, result_rx) = oneshot::channel();
        let app = App::new(options.clone());
        tokio::spawn(async move {
            let result = match run_app(app).await {
                Ok(choice) => choice,
                Err(e) => {
                    error!("Picker failed: {}", e);
                    None
                }
            };
            let _ = result_tx.send(result);
        });
        // A dropped sender means the picker task died; treat it as cancel.
        result_rx.await.ok().flatten()
    }

    async fn preview_auto_pick(&self, options: &PickOptions, choice: &str, delay: Duration) {
        let mut app = App::auto_picking(options.clone(), choice);
        match TerminalSession::start() {
            Ok(mut session) => {
                if let Err(e) = renderer::render(&mut session.terminal, &mut app) {
                    debug!("Could not draw auto-pick preview: {}", e);
                }
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!("Terminal unavailable for auto-pick preview: {}", e);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn run_app(mut app: App) -> std::io::Result<Option<String>> {
    let mut session = TerminalSession::start()?;

    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(100);
    let input = tokio::spawn(events::event_loop(event_tx));

    renderer::render(&mut session.terminal, &mut app)?;
    let outcome = loop {
        let Some(event) = event_rx.recv().await else {
            break None;
        };
        match event {
            AppEvent::Key(key) => match events::handle_key_event(&mut app, key) {
                KeyOutcome::Continue => {}
                KeyOutcome::Chosen(choice) => break Some(choice),
                KeyOutcome::Cancelled => break None,
            },
            AppEvent::Resize | AppEvent::Tick => {}
        }
        renderer::render(&mut session.terminal, &mut app)?;
    };

    input.abort();
    drop(session);
    Ok(outcome)
}
