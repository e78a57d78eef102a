mod capture;
mod config;
mod history;
mod input;
mod keywords;
mod session;
mod stats;
mod transcript;
mod ui;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use capture::supervisor::Supervisor;
use config::{ConfigFile, SessionConfig};
use session::Session;
use transcript::TranscriptWriter;

fn print_usage() {
    eprintln!("Usage: runlog [options] <command> [args...]");
    eprintln!();
    eprintln!("Run a command while capturing its output to a timestamped log");
    eprintln!("with a live, scrollable view and keyword highlighting.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --profile <name>  Use a named profile from the config file");
    eprintln!("  --silent          Capture without the live view");
    eprintln!("  -h, --help        Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.config/runlog/runlog.toml");
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut profile: Option<String> = None;
    let mut silent = false;
    let mut command: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "--silent" => silent = true,
            "--profile" => match args.next() {
                Some(name) => profile = Some(name),
                None => {
                    eprintln!("runlog: --profile requires a name");
                    std::process::exit(2);
                }
            },
            _ => {
                command.push(arg);
                command.extend(args);
                break;
            }
        }
    }

    if command.is_empty() {
        print_usage();
        std::process::exit(2);
    }

    let file = ConfigFile::load()?;
    let mut cfg = SessionConfig::resolve(&file, profile.as_deref())?;
    if silent {
        cfg.silent = true;
    }

    // Spawn before touching the log directory so a failed spawn leaves no
    // partial session artifacts.
    let keywords = Arc::new(cfg.keywords.clone());
    let supervisor = match Supervisor::spawn(&command[0], &command[1..], keywords) {
        Ok(sup) => sup,
        Err(e) => {
            eprintln!("runlog: {e}");
            std::process::exit(127);
        }
    };

    let program = Path::new(&command[0])
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| command[0].clone());
    let log_path = transcript::log_file_path(&cfg.log_dir, &cfg.profile, &program);

    let (writer, warning) = match TranscriptWriter::create(log_path.clone(), cfg.timestamp) {
        Ok(writer) => (Some(writer), None),
        Err(e) => (None, Some(format!("cannot open log file: {e}"))),
    };

    let silent = cfg.silent;
    let mut session = Session::new(cfg, writer, log_path);
    session.status_message = warning;

    let exit_code = if silent {
        run_silent(&mut session, supervisor).await?
    } else {
        run_tui(&mut session, supervisor).await?
    };
    std::process::exit(exit_code);
}

async fn run_tui(session: &mut Session, mut supervisor: Supervisor) -> Result<i32> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Restore the terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        original_hook(panic);
    }));

    let result = run_event_loop(&mut terminal, session, &mut supervisor).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;

    result?;
    Ok(session.exit_code.unwrap_or(1))
}

/// Delivery of `kill -INT` / `kill -TERM` sent to runlog itself. In raw
/// mode Ctrl+C arrives as a key event, but an externally delivered signal
/// still has to interrupt the run instead of killing the wrapper outright.
/// Streams are registered once so a signal arriving between polls is kept.
#[cfg(unix)]
struct ExternalInterrupts {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ExternalInterrupts {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct ExternalInterrupts;

#[cfg(not(unix))]
impl ExternalInterrupts {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &mut Session,
    supervisor: &mut Supervisor,
) -> Result<()> {
    let mut signals = ExternalInterrupts::new()?;

    loop {
        terminal.draw(|frame| ui::draw(frame, session))?;

        let page_size = terminal.size()?.height.saturating_sub(4) as usize;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(16)) => {
                if event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            if input::handle_key(session, key, page_size) == input::Action::Interrupt {
                                supervisor.interrupt();
                            }
                        }
                        Event::Mouse(mouse) => input::handle_mouse(session, mouse),
                        _ => {}
                    }
                }
            }

            _ = signals.recv() => {
                if session.finished() {
                    session.should_quit = true;
                } else {
                    let _ = input::request_interrupt(session);
                    supervisor.interrupt();
                }
            }

            event = supervisor.next_event(), if !session.finished() => {
                match event {
                    Some(event) => session.handle_event(event),
                    None => session.stream_closed(),
                }
            }
        }

        if session.should_quit {
            break;
        }
    }

    Ok(())
}

async fn run_silent(session: &mut Session, mut supervisor: Supervisor) -> Result<i32> {
    let mut signals = ExternalInterrupts::new()?;

    loop {
        tokio::select! {
            _ = signals.recv() => {
                supervisor.interrupt();
            }

            event = supervisor.next_event() => {
                match event {
                    Some(event) => session.handle_event(event),
                    None => session.stream_closed(),
                }
                if session.finished() {
                    break;
                }
            }
        }
    }

    print_summary(session);
    Ok(session.exit_code.unwrap_or(1))
}

fn print_summary(session: &Session) {
    let stats = session.stats();
    println!("Process finished: {}", stats.status.label());
    println!("Total time: {:.2}s", stats.elapsed.as_secs_f64());
    println!(
        "Total lines: {} ({} stdout / {} stderr)",
        stats.total_lines(),
        stats.stdout_lines,
        stats.stderr_lines
    );
    if !stats.keyword_counts.is_empty() {
        println!("Keyword counts:");
        for (keyword, count) in &stats.keyword_counts {
            println!("  {keyword}: {count}");
        }
    }
    println!("Log saved to: {}", session.log_path().display());
}
