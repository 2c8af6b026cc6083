use crate::model::PlaybackStatus;
use crate::presentation::Snapshot;
use crate::waveform::bucket_peaks;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

const APP_TITLE: &str = "GHOST PLAYER";
const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Front-end state that is not part of the player itself.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub cursor: usize,
    pub command_mode: bool,
    pub command_buffer: String,
    pub message: Option<String>,
    pub waveform_bins: usize,
}

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    played: Color,
    unplayed: Color,
    alert: Color,
    selected_bg: Color,
}

const GREEN_ON_BLACK: Palette = Palette {
    bg: Color::Rgb(0, 0, 0),
    panel_bg: Color::Rgb(4, 12, 4),
    border: Color::Rgb(39, 143, 62),
    text: Color::Rgb(180, 255, 185),
    muted: Color::Rgb(102, 177, 115),
    accent: Color::Rgb(0, 255, 0),
    played: Color::Rgb(95, 255, 122),
    unplayed: Color::Rgb(30, 90, 40),
    alert: Color::Rgb(255, 110, 90),
    selected_bg: Color::Rgb(18, 43, 20),
};

pub fn draw(frame: &mut Frame, snapshot: &Snapshot, view: &ViewState) {
    let colors = GREEN_ON_BLACK;
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(7),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(vertical[0]);

    draw_controls(frame, body[0], snapshot, &colors);
    draw_playlist(frame, body[1], snapshot, view.cursor, &colors);
    draw_waveform(frame, vertical[1], snapshot, view.waveform_bins, &colors);
    draw_message_line(frame, vertical[2], snapshot, view, &colors);
}

fn draw_controls(frame: &mut Frame, area: Rect, snapshot: &Snapshot, colors: &Palette) {
    let block = panel_block(APP_TITLE, colors);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let bar_width = usize::from(inner.width.saturating_sub(4)).max(4);
    let title = snapshot.title.as_deref().unwrap_or("No track loaded");
    let status_color = match snapshot.status {
        PlaybackStatus::Playing => colors.accent,
        PlaybackStatus::Stopped if snapshot.error_message.is_some() => colors.alert,
        _ => colors.muted,
    };
    let on_off = |enabled: bool| if enabled { "ON" } else { "OFF" };

    let lines = vec![
        Line::from(Span::styled(
            title.to_string(),
            Style::default()
                .fg(colors.text)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            snapshot.status.label(),
            Style::default().fg(status_color),
        )),
        Line::default(),
        Line::from(Span::styled(
            format!(
                "{}  {}  {}",
                snapshot.elapsed_label(),
                progress_bar(snapshot.scrub_fraction, bar_width.saturating_sub(16)),
                snapshot.remaining_label()
            ),
            Style::default().fg(colors.text),
        )),
        Line::default(),
        Line::from(vec![
            Span::styled("SHUFFLE ", Style::default().fg(colors.muted)),
            Span::styled(
                on_off(snapshot.shuffle),
                Style::default().fg(if snapshot.shuffle {
                    colors.accent
                } else {
                    colors.muted
                }),
            ),
            Span::raw("   "),
            Span::styled(
                snapshot.repeat.label(),
                Style::default().fg(if snapshot.repeat == crate::model::RepeatMode::Off {
                    colors.muted
                } else {
                    colors.accent
                }),
            ),
        ]),
        Line::from(Span::styled(
            format!(
                "VOLUME {} {:>3}%",
                progress_bar(f64::from(snapshot.volume) / 100.0, 20),
                snapshot.volume
            ),
            Style::default().fg(colors.text),
        )),
        Line::default(),
        Line::from(Span::styled(
            "Space play/pause  s stop  <-/-> back/next  ^/v volume",
            Style::default().fg(colors.muted),
        )),
        Line::from(Span::styled(
            "z shuffle  r repeat  0-9 seek  : command  q quit",
            Style::default().fg(colors.muted),
        )),
    ];

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn draw_playlist(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    cursor: usize,
    colors: &Palette,
) {
    let items: Vec<ListItem> = snapshot
        .tracks
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let marker = if snapshot.current_index == Some(index) {
                "> "
            } else {
                "  "
            };
            let length = row
                .duration
                .map(crate::presentation::format_clock)
                .unwrap_or_else(|| String::from("--:--"));
            let style = if snapshot.current_index == Some(index) {
                Style::default().fg(colors.accent)
            } else {
                Style::default().fg(colors.text)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{marker}{:>3}. ", index + 1), style),
                Span::styled(row.title.clone(), style),
                Span::styled(format!("  {length}"), Style::default().fg(colors.muted)),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    if !snapshot.tracks.is_empty() {
        state.select(Some(cursor.min(snapshot.tracks.len() - 1)));
    }

    let title = format!("Playlist ({})", snapshot.tracks.len());
    let list = List::new(items)
        .block(panel_block(&title, colors))
        .highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_waveform(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    bins: usize,
    colors: &Palette,
) {
    let block = panel_block("Waveform", colors);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let width = usize::from(inner.width);
    let amplitudes = match &snapshot.waveform {
        Some(waveform) => bucket_peaks(&waveform.resample(bins.max(width)), width),
        None => vec![0.0; width],
    };
    let lines = waveform_lines(
        &amplitudes,
        usize::from(inner.height),
        snapshot.scrub_fraction,
        colors,
    );
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Vertical bars, one column per amplitude, split at the playhead.
fn waveform_lines(
    amplitudes: &[f32],
    height: usize,
    played_fraction: f64,
    colors: &Palette,
) -> Vec<Line<'static>> {
    let played_columns = (played_fraction.clamp(0.0, 1.0) * amplitudes.len() as f64).round() as usize;
    let levels = (height * BAR_GLYPHS.len()) as f32;

    (0..height)
        .map(|row| {
            let floor = (height - 1 - row) * BAR_GLYPHS.len();
            let spans: Vec<Span> = amplitudes
                .iter()
                .enumerate()
                .map(|(column, amplitude)| {
                    let filled = (amplitude.clamp(0.0, 1.0) * levels).round() as usize;
                    let glyph = match filled.saturating_sub(floor) {
                        0 if row == height - 1 => BAR_GLYPHS[0],
                        0 => ' ',
                        n => BAR_GLYPHS[n.min(BAR_GLYPHS.len()) - 1],
                    };
                    let color = if column < played_columns {
                        colors.played
                    } else {
                        colors.unplayed
                    };
                    Span::styled(glyph.to_string(), Style::default().fg(color))
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn draw_message_line(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    view: &ViewState,
    colors: &Palette,
) {
    let line = if view.command_mode {
        Line::from(Span::styled(
            format!(":{}", view.command_buffer),
            Style::default().fg(colors.accent),
        ))
    } else if let Some(error) = &snapshot.error_message {
        Line::from(Span::styled(
            format!("Error: {error}"),
            Style::default().fg(colors.alert),
        ))
    } else if let Some(message) = &view.message {
        Line::from(Span::styled(message.clone(), Style::default().fg(colors.text)))
    } else if let Some(warning) = &snapshot.warning {
        Line::from(Span::styled(warning.clone(), Style::default().fg(colors.muted)))
    } else {
        Line::from(Span::styled(
            ":help for commands",
            Style::default().fg(colors.muted),
        ))
    };
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(colors.bg)),
        area,
    );
}

fn panel_block<'a>(title: &str, colors: &Palette) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default()
                .fg(colors.text)
                .add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(colors.border))
        .style(Style::default().bg(colors.panel_bg))
}

fn progress_bar(ratio: f64, width: usize) -> String {
    let clamped = if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RepeatMode, TrackId};
    use crate::presentation::TrackRow;
    use crate::waveform::Waveform;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn snapshot() -> Snapshot {
        Snapshot {
            status: PlaybackStatus::Playing,
            current_track: Some(TrackId(1)),
            current_index: Some(1),
            title: Some(String::from("Second Song")),
            elapsed: Duration::from_secs(65),
            remaining: Duration::from_secs(135),
            duration: Some(Duration::from_secs(200)),
            scrub_fraction: 0.325,
            shuffle: true,
            repeat: RepeatMode::All,
            volume: 70,
            waveform: Some(Arc::new(Waveform::new(vec![0.2, 1.0, 0.4, 0.8]))),
            error_message: None,
            warning: None,
            tracks: Arc::from(vec![
                TrackRow {
                    id: TrackId(0),
                    title: String::from("First Song"),
                    duration: Some(Duration::from_secs(180)),
                },
                TrackRow {
                    id: TrackId(1),
                    title: String::from("Second Song"),
                    duration: Some(Duration::from_secs(200)),
                },
            ]),
        }
    }

    fn rendered_text(snapshot: &Snapshot, view: &ViewState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|frame| draw(frame, snapshot, view))
            .expect("draw");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn progress_bar_clamps_ratio() {
        assert_eq!(progress_bar(0.5, 4), "[##--]");
        assert_eq!(progress_bar(2.0, 3), "[###]");
        assert_eq!(progress_bar(f64::NAN, 2), "[--]");
    }

    #[test]
    fn waveform_rows_fill_from_the_bottom() {
        let lines = waveform_lines(&[0.0, 1.0], 2, 0.0, &GREEN_ON_BLACK);
        assert_eq!(lines.len(), 2);
        let top: String = lines[0].spans.iter().map(|span| span.content.as_ref()).collect();
        let bottom: String = lines[1].spans.iter().map(|span| span.content.as_ref()).collect();
        assert_eq!(top, " █");
        assert_eq!(bottom, "▁█");
    }

    #[test]
    fn waveform_colors_split_at_playhead() {
        let lines = waveform_lines(&[0.5; 4], 1, 0.5, &GREEN_ON_BLACK);
        let colors: Vec<_> = lines[0].spans.iter().map(|span| span.style.fg).collect();
        assert_eq!(
            colors,
            vec![
                Some(GREEN_ON_BLACK.played),
                Some(GREEN_ON_BLACK.played),
                Some(GREEN_ON_BLACK.unplayed),
                Some(GREEN_ON_BLACK.unplayed),
            ]
        );
    }

    #[test]
    fn draw_shows_track_times_and_modes() {
        let view = ViewState {
            waveform_bins: 200,
            ..ViewState::default()
        };
        let text = rendered_text(&snapshot(), &view);
        assert!(text.contains("Second Song"));
        assert!(text.contains("01:05"));
        assert!(text.contains("-02:15"));
        assert!(text.contains("REPEAT (ALL)"));
        assert!(text.contains("Playlist (2)"));
    }

    #[test]
    fn command_line_replaces_message_line() {
        let mut shown = snapshot();
        shown.error_message = Some(String::from("cannot decode"));
        let view = ViewState {
            command_mode: true,
            command_buffer: String::from("load mix.json"),
            ..ViewState::default()
        };
        let text = rendered_text(&shown, &view);
        assert!(text.contains(":load mix.json"));
        assert!(!text.contains("cannot decode"));
    }
}
