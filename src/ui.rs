use anyhow::Result;
use banking_etl::db::DashboardSnapshot;
use banking_etl::AnomalyReason;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

/// Rows fetched for the preview tables
pub const PREVIEW_ROWS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Transactions,
    Anomalies,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Transactions,
            Page::Transactions => Page::Anomalies,
            Page::Anomalies => Page::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Overview => Page::Anomalies,
            Page::Transactions => Page::Overview,
            Page::Anomalies => Page::Transactions,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Overview => "Overview",
            Page::Transactions => "Clean Transactions",
            Page::Anomalies => "Anomalies",
        }
    }
}

pub struct App {
    pub snapshot: DashboardSnapshot,
    pub current_page: Page,
    pub transactions_state: TableState,
    pub anomalies_state: TableState,
}

impl App {
    pub fn new(snapshot: DashboardSnapshot) -> Self {
        let mut transactions_state = TableState::default();
        if !snapshot.recent_clean.is_empty() {
            transactions_state.select(Some(0));
        }
        let mut anomalies_state = TableState::default();
        if !snapshot.recent_anomalies.is_empty() {
            anomalies_state.select(Some(0));
        }

        App {
            snapshot,
            current_page: Page::Overview,
            transactions_state,
            anomalies_state,
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    /// Table state and row count for the current page, if it has a table
    fn active_table(&mut self) -> Option<(&mut TableState, usize)> {
        match self.current_page {
            Page::Overview => None,
            Page::Transactions => {
                Some((&mut self.transactions_state, self.snapshot.recent_clean.len()))
            }
            Page::Anomalies => {
                Some((&mut self.anomalies_state, self.snapshot.recent_anomalies.len()))
            }
        }
    }

    pub fn next(&mut self) {
        if let Some((state, len)) = self.active_table() {
            if len == 0 {
                return;
            }
            let i = match state.selected() {
                Some(i) if i + 1 < len => i + 1,
                _ => 0,
            };
            state.select(Some(i));
        }
    }

    pub fn previous(&mut self) {
        if let Some((state, len)) = self.active_table() {
            if len == 0 {
                return;
            }
            let i = match state.selected() {
                Some(0) | None => len - 1,
                Some(i) => i - 1,
            };
            state.select(Some(i));
        }
    }

    pub fn page_down(&mut self) {
        if let Some((state, len)) = self.active_table() {
            if len == 0 {
                return;
            }
            let i = state.selected().map_or(0, |i| (i + 20).min(len - 1));
            state.select(Some(i));
        }
    }

    pub fn page_up(&mut self) {
        if let Some((state, _)) = self.active_table() {
            let i = state.selected().map_or(0, |i| i.saturating_sub(20));
            state.select(Some(i));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Overview => render_overview(f, chunks[1], app),
        Page::Transactions => render_transactions(f, chunks[1], app),
        Page::Anomalies => render_anomalies(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Overview, Page::Transactions, Page::Anomalies];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title(), style));
    }

    let snapshot = &app.snapshot;
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Clean: {}", snapshot.clean_count),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Anomalies: {}", snapshot.anomaly_count),
        Style::default().fg(Color::Red),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Accounts: {}", snapshot.unique_accounts),
        Style::default().fg(Color::Cyan),
    ));

    let header = Paragraph::new(Line::from(tab_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Banking ETL Dashboard "),
    );

    f.render_widget(header, area);
}

fn reason_color(reason: AnomalyReason) -> Color {
    match reason {
        AnomalyReason::HighValue => Color::Magenta,
        AnomalyReason::RapidRepeat => Color::Yellow,
        AnomalyReason::NonPositiveAmount => Color::Red,
    }
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    let snapshot = &app.snapshot;

    // Anomalies by reason
    let reason_data: Vec<(&str, u64)> = snapshot
        .anomalies_by_reason
        .iter()
        .map(|(reason, count)| (reason.as_str(), *count as u64))
        .collect();

    let reason_chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Anomalies by Reason "),
        )
        .data(reason_data.as_slice())
        .bar_width(21)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Red))
        .value_style(Style::default().fg(Color::Black).bg(Color::Red));
    f.render_widget(reason_chart, top[0]);

    // Top merchant categories
    let header = Row::new(["Category", "Transactions"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray));

    let category_rows = snapshot.top_categories.iter().map(|(category, count)| {
        Row::new(vec![
            Cell::from(truncate(category, 24)),
            Cell::from(count.to_string()),
        ])
    });

    let categories = Table::new(category_rows, [Constraint::Length(26), Constraint::Length(14)])
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Top Merchant Categories "),
        );
    f.render_widget(categories, top[1]);

    // Hourly volume, zero-filled so every hour has a bar
    let labels: Vec<String> = (0..24).map(|h| format!("{:02}", h)).collect();
    let volume = snapshot.full_day_volume();
    let hourly_data: Vec<(&str, u64)> = labels
        .iter()
        .zip(volume.iter())
        .map(|(label, count)| (label.as_str(), *count as u64))
        .collect();

    let hourly_chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Transactions per Hour (UTC) "),
        )
        .data(hourly_data.as_slice())
        .bar_width(3)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(hourly_chart, rows[1]);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1)
}

fn render_transactions(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&[
        "Timestamp", "Txn", "Account", "Merchant", "Category", "Amount", "Cur",
    ]);

    let rows = app.snapshot.recent_clean.iter().map(|tx| {
        let color = if tx.amount <= 0.0 {
            Color::Red
        } else if tx.is_high_value {
            Color::Magenta
        } else {
            Color::White
        };

        Row::new(vec![
            Cell::from(tx.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::from(truncate(&tx.txn_id, 24)),
            Cell::from(tx.account_id.clone()),
            Cell::from(truncate(&tx.merchant, 20)),
            Cell::from(truncate(tx.merchant_category.as_deref().unwrap_or("-"), 14)),
            Cell::from(format!("{:.2}", tx.amount)).style(Style::default().fg(color)),
            Cell::from(tx.currency.clone().unwrap_or_default()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(26),
            Constraint::Length(12),
            Constraint::Length(22),
            Constraint::Length(16),
            Constraint::Length(12),
            Constraint::Length(5),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Latest Clean Transactions "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.transactions_state);
}

fn render_anomalies(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["Timestamp", "Txn", "Account", "Reason"]);

    let rows = app.snapshot.recent_anomalies.iter().map(|anomaly| {
        Row::new(vec![
            Cell::from(anomaly.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::from(truncate(&anomaly.txn_id, 24)),
            Cell::from(anomaly.account_id.clone()),
            Cell::from(anomaly.reason.as_str())
                .style(Style::default().fg(reason_color(anomaly.reason))),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(26),
            Constraint::Length(12),
            Constraint::Length(22),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Latest Anomalies "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.anomalies_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    let position = match app.current_page {
        Page::Overview => None,
        Page::Transactions => Some((&app.transactions_state, app.snapshot.recent_clean.len())),
        Page::Anomalies => Some((&app.anomalies_state, app.snapshot.recent_anomalies.len())),
    };
    if let Some((state, total)) = position {
        let selected = state.selected().map(|i| i + 1).unwrap_or(0);
        status_spans.push(Span::styled(
            format!(" Row: {}/{} ", selected, total),
            Style::default().fg(Color::Cyan),
        ));
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Nav | "));
        status_spans.push(Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Fast | "));
    } else {
        status_spans.push(Span::raw(" "));
    }

    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
