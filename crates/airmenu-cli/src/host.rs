//! Console host for the engine.
//!
//! Prints the title and a numbered menu, reads a choice from stdin and
//! forwards it to the engine. Title changes made by the poller are printed
//! as they happen.
//!
//! stdin is only read while waiting for a menu choice. A credential reset
//! runs inline so the prompt owns the terminal until it is answered, and
//! title changes are not printed while it is open.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use airmenu_core::{AirMenu, ClientOutcome, MenuAction, MenuEntry};

const SEPARATOR: &str = "     ──────────────────────";

/// Menu text plus the action behind each number.
#[derive(Debug)]
pub struct RenderedMenu {
    pub text: String,
    /// `actions[n - 1]` is what choice `n` does.
    pub actions: Vec<MenuAction>,
}

/// A line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Zero-based index into [`RenderedMenu::actions`].
    Activate(usize),
    Refresh,
    Quit,
    Invalid(String),
}

#[derive(Clone, Copy)]
enum Tone {
    Title,
    Number,
    Selected,
    Muted,
}

fn paint(text: &str, tone: Tone, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match tone {
        Tone::Title => text.bold().to_string(),
        Tone::Number => text.cyan().to_string(),
        Tone::Selected => text.green().to_string(),
        Tone::Muted => text.dimmed().to_string(),
    }
}

/// Render the title and menu entries.
pub fn render(title: &str, entries: &[MenuEntry], color: bool) -> RenderedMenu {
    let header = if title.is_empty() {
        "AirMenu".to_string()
    } else {
        format!("AirMenu  {}", title)
    };

    let mut menu = RenderedMenu {
        text: format!("\n{}\n", paint(&header, Tone::Title, color)),
        actions: Vec::new(),
    };
    render_entries(entries, 0, color, &mut menu);
    menu.text
        .push_str(&paint("Choose a number, r to refresh, q to quit: ", Tone::Muted, color));
    menu
}

fn render_entries(entries: &[MenuEntry], depth: usize, color: bool, menu: &mut RenderedMenu) {
    let indent = "  ".repeat(depth);
    for entry in entries {
        if entry.separator {
            menu.text.push_str(&paint(SEPARATOR, Tone::Muted, color));
            menu.text.push('\n');
            continue;
        }

        let check = match entry.selected {
            Some(true) => paint("[x] ", Tone::Selected, color),
            Some(false) => "[ ] ".to_string(),
            None => String::new(),
        };

        let line = match &entry.action {
            Some(action) => {
                menu.actions.push(action.clone());
                let number = format!("{:>3}.", menu.actions.len());
                format!(
                    "{} {}{}{}",
                    paint(&number, Tone::Number, color),
                    indent,
                    check,
                    entry.label
                )
            }
            None => format!("     {}{}", indent, paint(&entry.label, Tone::Muted, color)),
        };
        menu.text.push_str(&line);
        menu.text.push('\n');

        render_entries(&entry.children, depth + 1, color, menu);
    }
}

/// Interpret one line of input against a menu with `choices` numbered rows.
pub fn parse_command(input: &str, choices: usize) -> Command {
    match input.trim() {
        "" | "r" => Command::Refresh,
        "q" | "quit" => Command::Quit,
        other => match other.parse::<usize>() {
            Ok(n) if (1..=choices).contains(&n) => Command::Activate(n - 1),
            _ => Command::Invalid(other.to_string()),
        },
    }
}

/// Interactive loop over an [`AirMenu`].
pub struct ConsoleHost {
    engine: Arc<AirMenu>,
    color: bool,
    prompting: Arc<AtomicBool>,
}

impl ConsoleHost {
    pub fn new(engine: Arc<AirMenu>, color: bool) -> Self {
        Self {
            engine,
            color,
            prompting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run until the user quits or stdin closes.
    pub async fn run(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_title(
            Arc::clone(&self.engine),
            cancel.clone(),
            Arc::clone(&self.prompting),
            self.color,
        ));

        let result = self.menu_loop().await;

        cancel.cancel();
        if let Err(e) = watcher.await {
            warn!("Title watcher failed: {}", e);
        }
        result
    }

    async fn menu_loop(&self) -> Result<()> {
        loop {
            let title = self.engine.title().await;
            let entries = self.engine.menu().await;
            let menu = render(&title, &entries, self.color);
            print!("{}", menu.text);
            io::Write::flush(&mut io::stdout()).context("Failed to flush stdout")?;

            let Some(line) = read_line().await? else {
                return Ok(());
            };

            match parse_command(&line, menu.actions.len()) {
                Command::Quit => return Ok(()),
                Command::Refresh => {}
                Command::Invalid(input) => eprintln!("Unknown choice: {}", input),
                Command::Activate(index) => {
                    if let Some(action) = menu.actions.get(index).cloned() {
                        self.activate(action).await;
                    }
                }
            }
        }
    }

    async fn activate(&self, action: MenuAction) {
        match action {
            MenuAction::ResetCredentials => {
                self.prompting.store(true, Ordering::Release);
                let outcome = self.engine.reset_credentials().await;
                self.prompting.store(false, Ordering::Release);
                match outcome {
                    Ok(ClientOutcome::Cancelled) => eprintln!("Credentials unchanged"),
                    Ok(_) => {}
                    Err(e) => eprintln!("Failed to reset credentials: {}", e),
                }
            }
            other => self.engine.activate(other).await,
        }
    }
}

/// One line from stdin, `None` at end of input.
async fn read_line() -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        let read = io::stdin().read_line(&mut buf)?;
        Ok::<_, io::Error>((read > 0).then_some(buf))
    })
    .await
    .context("stdin reader task failed")?
    .context("Failed to read from stdin")?;
    Ok(line)
}

/// The line to print for a new title, if any.
///
/// `last` always tracks the newest title so a change swallowed while
/// `paused` is not printed late.
fn title_update(last: &mut String, title: String, paused: bool, color: bool) -> Option<String> {
    if title == *last {
        return None;
    }
    *last = title;
    (!paused).then(|| format!("\n{} {}", paint("title:", Tone::Muted, color), last))
}

async fn watch_title(
    engine: Arc<AirMenu>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    color: bool,
) {
    let mut changes = engine.subscribe();
    let mut last = engine.title().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let title = engine.title().await;
        if let Some(line) = title_update(&mut last, title, paused.load(Ordering::Acquire), color) {
            println!("{}", line);
        }
    }
}
