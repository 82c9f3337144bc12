use crate::app::view::ViewModel;
use crate::console::Console;
use crate::menu::MenuTree;
use crate::model::AppConfig;
use crate::nav::keys::{map_key, parse_script, KeyAction};
use crate::render::{JsonRenderer, Renderer, TerminalRenderer};
use crate::settings::{Settings, CONFIG_FILE_NAME};
use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{CrosstermBackend, TestBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const CONFIG_DIR_ENV: &str = "PEN_DECK_CONFIG_DIR";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

/// Where the configuration lives. The first existing candidate wins; when none
/// exists the first candidate is where the defaults get written.
pub fn config_candidates() -> Vec<PathBuf> {
    if let Ok(base) = std::env::var(CONFIG_DIR_ENV) {
        return vec![PathBuf::from(base).join(CONFIG_FILE_NAME)];
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut out = vec![
        cwd.join(CONFIG_FILE_NAME),
        cwd.join(".pen-deck").join(CONFIG_FILE_NAME),
    ];
    if let Some(home) = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
    {
        out.push(home.join(".pen-deck").join(CONFIG_FILE_NAME));
    }
    out
}

pub fn discover_config() -> PathBuf {
    let candidates = config_candidates();
    candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .unwrap_or_else(|| candidates[0].clone())
}

pub fn load_settings() -> Result<Settings> {
    let path = discover_config();
    Settings::load(&path).with_context(|| format!("loading configuration {path:?}"))
}

fn build_console(settings: &Settings) -> Result<Console> {
    let cfg = AppConfig::from_settings(settings).context("reading menu configuration")?;
    let tree = MenuTree::build(&cfg).map_err(|e| {
        error!("invalid menu configuration: {e}");
        e
    });
    let tree = tree.context("invalid menu configuration")?;
    info!(nodes = tree.len(), "menu loaded");
    let sys = settings.system();
    let console = Console::new(Arc::new(tree), &sys);
    match console.store().cleanup(sys.max_results_files) {
        Ok(0) => {}
        Ok(n) => info!(removed = n, "old results removed"),
        Err(e) => warn!("result retention skipped: {e}"),
    }
    let missing = console.mark_unavailable();
    if missing > 0 {
        info!(missing, "some tools are not installed");
    }
    Ok(console)
}

pub fn run(settings: Settings) -> Result<()> {
    match settings.path() {
        Some(path) if settings.created() => {
            info!(?path, "no configuration found, wrote defaults")
        }
        Some(path) => info!(?path, "loaded configuration"),
        None => info!("using embedded configuration"),
    }
    let console = build_console(&settings)?;
    let res = if env_flag("PEN_DECK_HEADLESS") {
        run_headless(&console)
    } else {
        run_interactive(&console)
    };
    console.shutdown();
    res
}

fn run_headless(console: &Console) -> Result<()> {
    let script = match std::env::var("PEN_DECK_INPUT") {
        Ok(s) => parse_script(&s).map_err(anyhow::Error::msg)?,
        Err(_) => Vec::new(),
    };
    let ticks: usize = std::env::var("PEN_DECK_TICKS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
        .max(script.len() + 1);
    let summary = env_flag("PEN_DECK_SMOKE_SUMMARY");
    let tick_rate = Duration::from_millis(50);

    let mut renderer = TerminalRenderer::new(TestBackend::new(80, 24))?;
    let mut events = script.into_iter();
    let mut fed = 0usize;
    let mut job_seen = false;
    let mut view = console.current_view();
    for _ in 0..ticks {
        console.pump();
        view = match events.next() {
            Some(ev) => {
                fed += 1;
                console.handle_input(ev)
            }
            None => console.current_view(),
        };
        job_seen |= view.job().is_some();
        renderer.render(&view)?;
        renderer.tick();
        std::thread::sleep(tick_rate);
    }
    if summary {
        let mut report = smoke_summary(console, &view);
        report["ticks"] = ticks.into();
        report["events_fed"] = fed.into();
        report["job_seen"] = job_seen.into();
        println!("{report}");
        let mut json = JsonRenderer::new(std::io::stdout());
        json.render(&view)?;
    }
    Ok(())
}

fn smoke_summary(console: &Console, view: &ViewModel) -> serde_json::Value {
    let job = view
        .job()
        .and_then(|j| j.id)
        .and_then(|id| console.job_status(id));
    serde_json::json!({
        "ok": true,
        "path": view.path,
        "job": job,
    })
}

fn copy_to_clipboard(view: &ViewModel) -> Option<String> {
    let text = view.copyable_text()?;
    match arboard::Clipboard::new().and_then(|mut c| c.set_text(text)) {
        Ok(()) => Some("Copied to clipboard!".to_string()),
        Err(e) => {
            warn!("clipboard unavailable: {e}");
            Some("Clipboard unavailable".to_string())
        }
    }
}

fn run_interactive(console: &Console) -> Result<()> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let mut renderer = TerminalRenderer::new(CrosstermBackend::new(stdout))?;
    let res = event_loop(console, &mut renderer);
    disable_raw_mode()?;
    execute!(std::io::stdout(), LeaveAlternateScreen)?;
    renderer.terminal_mut().show_cursor()?;
    res
}

fn event_loop<B: ratatui::backend::Backend>(
    console: &Console,
    renderer: &mut TerminalRenderer<B>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    // transient message from the loop itself (clipboard), shown until the next key
    let mut flash: Option<String> = None;
    loop {
        console.pump();
        let mut view = console.current_view();
        if view.notice.is_none() {
            view.notice = flash.clone();
        }
        renderer.render(&view)?;
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                flash = None;
                match map_key(key) {
                    Some(KeyAction::Quit) => return Ok(()),
                    Some(KeyAction::Copy) => flash = copy_to_clipboard(&view),
                    Some(KeyAction::Input(ev)) => {
                        console.handle_input(ev);
                    }
                    None => {}
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            renderer.tick();
            last_tick = Instant::now();
        }
    }
}
