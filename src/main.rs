//! # Infection Sim
//!
//! A terminal front end for the infection spread simulation, built on `ratatui`
//! for the interface and `crossterm` for terminal manipulation.
//!
//! ## Features
//!
//! * Grid of people reshaped to the width of the terminal
//! * Manual infection by keyboard cursor or mouse click/drag
//! * Live healthy/infected statistics
//! * Start, stop and implicit restart of the simulation

use std::{
    fs::File,
    io,
    path::PathBuf,
    sync::{mpsc::Receiver, Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use infection_sim::{
    config::period_from_secs, GridLayout, Person, SimulationConfig, SimulationEvent, Simulator,
    Stats,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Terminal,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command line parameters, validated before the interface starts.
#[derive(Parser, Debug)]
#[command(name = "infection_sim", about = "Infection spread simulation in the terminal")]
struct Cli {
    /// Number of people in the group
    #[arg(short = 'n', long, default_value_t = 400)]
    group_size: usize,

    /// Maximum number of neighbours one infected person infects per step
    #[arg(short = 'f', long, default_value_t = 3)]
    infection_factor: usize,

    /// Seconds between two simulation steps
    #[arg(short = 'p', long, default_value_t = 1.0)]
    period: f64,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Write logs to this file (filtered by RUST_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn simulation_config(&self) -> infection_sim::Result<SimulationConfig> {
        let period = period_from_secs(self.period)?;
        let config = SimulationConfig::new(self.group_size, self.infection_factor, period)?;
        Ok(match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        })
    }
}

/// Interface state mirrored from the simulator's notifications.
struct App {
    sim: Simulator,
    events: Receiver<SimulationEvent>,
    /// Latest population pushed by the simulator
    people: Arc<[Person]>,
    /// Latest statistics pushed by the simulator
    stats: Stats,
    running: bool,
    /// Index of the highlighted person
    cursor: usize,
    /// Row width last pushed to the simulator
    layout: Option<GridLayout>,
    /// Inner area of the grid panel and its vertical scroll, kept for mouse hits
    grid_area: Rect,
    scroll: usize,
}

impl App {
    fn new(sim: Simulator) -> App {
        let events = sim.subscribe();
        let people = Arc::from(sim.people());
        let stats = sim.statistics();
        App {
            sim,
            events,
            people,
            stats,
            running: false,
            cursor: 0,
            layout: None,
            grid_area: Rect::default(),
            scroll: 0,
        }
    }

    /// Applies every pending simulator notification.
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SimulationEvent::PopulationUpdated(people) => self.people = people,
                SimulationEvent::StatisticsUpdated(stats) => self.stats = stats,
                SimulationEvent::RunningChanged(running) => self.running = running,
                SimulationEvent::PersonInfected(_) => {}
            }
        }
    }

    /// Pushes the grid width to the simulator whenever the panel is resized.
    fn update_layout(&mut self, area: Rect) {
        self.grid_area = area;
        let width = usize::from(area.width).max(1);
        if self.layout.map(|l| l.items_per_row()) == Some(width) {
            return;
        }
        match self.sim.set_items_per_row(width) {
            Ok(()) => self.layout = GridLayout::new(width).ok(),
            Err(err) => error!(%err, "rejected layout"),
        }
    }

    fn infect(&mut self, index: usize) {
        match self.sim.infect_at(index) {
            Ok(true) => self.sim.request_statistics(),
            Ok(false) => {}
            Err(err) => error!(%err, index, "manual infection failed"),
        }
    }

    fn toggle_running(&mut self) {
        let result = if self.sim.is_running() {
            self.sim.stop();
            Ok(())
        } else {
            self.sim.start()
        };
        if let Err(err) = result {
            error!(%err, "could not toggle simulation");
        }
    }

    /// Moves the cursor by whole rows or columns, staying inside the population.
    fn move_cursor(&mut self, rows: isize, columns: isize) {
        let Some(layout) = self.layout else { return };
        let (row, column) = layout.position(self.cursor);
        let row = row.saturating_add_signed(rows);
        let column = column.saturating_add_signed(columns);
        if let Some(index) = layout.index_at(row, column, self.people.len()) {
            self.cursor = index;
        }
    }

    /// Maps a terminal cell to the person drawn there.
    fn person_at(&self, x: u16, y: u16) -> Option<usize> {
        let area = self.grid_area;
        if x < area.x || y < area.y || x >= area.x + area.width || y >= area.y + area.height {
            return None;
        }
        let layout = self.layout?;
        let row = usize::from(y - area.y) + self.scroll;
        let column = usize::from(x - area.x);
        layout.index_at(row, column, self.people.len())
    }
}

/// Draws the population grid, one glyph per person.
///
/// Infected people are red, healthy ones green; the cursor is highlighted.
/// The view scrolls so the cursor row stays visible.
///
/// # Arguments
///
/// * `f` - The frame to draw on
/// * `app` - The application state
/// * `area` - The area of the terminal to draw in
fn draw_grid(f: &mut ratatui::Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Infection Sim [Space: Start/Stop | Arrows + Enter/Click: Infect | q: Quit]");
    let inner = block.inner(area);
    app.update_layout(inner);

    let Some(layout) = app.layout else {
        f.render_widget(block, area);
        return;
    };

    let visible_rows = usize::from(inner.height).max(1);
    let (cursor_row, _) = layout.position(app.cursor);
    if cursor_row < app.scroll {
        app.scroll = cursor_row;
    } else if cursor_row >= app.scroll + visible_rows {
        app.scroll = cursor_row + 1 - visible_rows;
    }

    let lines: Vec<Line> = app
        .people
        .chunks(layout.items_per_row())
        .enumerate()
        .skip(app.scroll)
        .take(visible_rows)
        .map(|(row, people)| {
            let spans: Vec<Span> = people
                .iter()
                .enumerate()
                .map(|(column, person)| {
                    let index = row * layout.items_per_row() + column;
                    let color = if person.is_infected() {
                        Color::Red
                    } else {
                        Color::Green
                    };
                    let mut style = Style::default().fg(color);
                    if index == app.cursor {
                        style = style.bg(Color::White);
                    }
                    Span::styled("•", style)
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Draws the statistics panel.
///
/// # Arguments
///
/// * `f` - The frame to draw on
/// * `app` - The application state
/// * `area` - The area of the terminal to draw in
fn draw_stats(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let config = app.sim.config();
    let stats_text = format!(
        "Statistics:\n\
        Healthy: {}\n\
        Infected: {}\n\
        Infected share: {:.1}%\n\
        \n\
        Group size: {}\n\
        Infection factor: {}\n\
        Period: {:.2}s\n\
        Per row: {}\n\
        Status: {}\n",
        app.stats.healthy,
        app.stats.infected,
        app.stats.infected_ratio() * 100.0,
        config.group_size,
        config.infection_factor,
        app.sim.period().as_secs_f64(),
        app.layout
            .map_or_else(|| "-".to_string(), |l| l.items_per_row().to_string()),
        if app.running { "Running" } else { "Stopped" }
    );

    let stats_widget = Paragraph::new(stats_text)
        .block(Block::default().borders(Borders::ALL).title("Statistics"))
        .wrap(Wrap { trim: true });

    f.render_widget(stats_widget, area);
}

fn init_tracing(log_file: Option<&PathBuf>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

/// Runs the interface until the user quits.
///
/// # Controls
///
/// * Space: Start/Stop the simulation
/// * Arrows: Move the cursor
/// * Enter or i: Infect the person under the cursor
/// * Left click or drag: Infect the clicked people
/// * q or Esc: Quit
fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let refresh = Duration::from_millis(50);

    loop {
        app.drain_events();
        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(75), Constraint::Percentage(25)].as_ref())
                .split(f.size());

            draw_grid(f, app, chunks[0]);
            draw_stats(f, app, chunks[1]);
        })?;

        if !event::poll(refresh)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char(' ') => app.toggle_running(),
                KeyCode::Enter | KeyCode::Char('i') => app.infect(app.cursor),
                KeyCode::Up => app.move_cursor(-1, 0),
                KeyCode::Down => app.move_cursor(1, 0),
                KeyCode::Left => app.move_cursor(0, -1),
                KeyCode::Right => app.move_cursor(0, 1),
                _ => {}
            },
            Event::Mouse(mouse) => {
                if let MouseEventKind::Down(MouseButton::Left)
                | MouseEventKind::Drag(MouseButton::Left) = mouse.kind
                {
                    if let Some(index) = app.person_at(mouse.column, mouse.row) {
                        app.cursor = index;
                        app.infect(index);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Main entry point.
///
/// Parses and validates the parameters, sets up the terminal, runs the
/// interface and restores the terminal afterwards, even if the interface failed.
///
/// # Errors
///
/// Returns an error for invalid parameters or if terminal manipulation fails.
fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli
        .simulation_config()
        .context("invalid simulation parameters")?;
    init_tracing(cli.log_file.as_ref())?;

    let sim = Simulator::new(config)?;
    info!("starting terminal interface");
    let mut app = App::new(sim);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.sim.stop();
    result
}
