use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, Focus, EXAMPLE_PROMPTS};
use math_tutor::attachment::format_size;
use math_tutor::presenter::ASSISTANT_NAME;

const DISCLAIMER: &str = "AI có thể mắc lỗi. Hãy kiểm tra lại thông tin quan trọng.";
const INPUT_PLACEHOLDER: &str = "Nhập bài toán hoặc đính kèm ảnh (Ctrl+O)...";

/// Most draft rows shown before the input box scrolls.
const MAX_INPUT_ROWS: u16 = 5;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let draft_rows = (app.controller.draft().split('\n').count() as u16).clamp(1, MAX_INPUT_ROWS);
    let chip_height = u16::from(app.controller.pending().is_some());

    // Main layout: header, body, attachment chip, input, hints, disclaimer
    let [header_area, body_area, chip_area, input_area, hints_area, disclaimer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(chip_height),
        Constraint::Length(draft_rows + 2),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.controller.transcript().is_empty() && !app.controller.is_submitting() {
        app.chat_area = None;
        render_welcome(frame, body_area);
    } else {
        render_transcript(app, frame, body_area);
    }

    if chip_height > 0 {
        render_attachment_chip(app, frame, chip_area);
    }
    render_input(app, frame, input_area);
    render_hints(app, frame, hints_area);

    let disclaimer = Paragraph::new(DISCLAIMER)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(disclaimer, disclaimer_area);

    // Render popups (in order of priority)
    if let Some(message) = &app.alert {
        render_alert(message, frame, area);
    } else if app.attach_input.is_some() {
        render_attach_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(format!(" {} ", ASSISTANT_NAME), Style::default().fg(Color::Cyan).bold()),
        Span::styled("Gia sư Toán AI ", Style::default().fg(Color::White)),
        Span::styled(
            format!("[{}: {}]", app.provider.display_name(), app.model),
            Style::default().fg(Color::Black),
        ),
    ];
    if !app.renderer.engine().is_ready() {
        spans.push(Span::styled(" ⏳ công thức", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Black),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_welcome(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);

    let mut lines = vec![
        Line::default(),
        Line::from(Span::styled(
            "Chào bạn! Mình là trợ lý học Toán.",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "Gõ đề bài hoặc đính kèm ảnh chụp bài tập, mình sẽ giải thích từng bước.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::default(),
        Line::from(Span::styled("Thử một ví dụ:", Style::default().fg(Color::White))),
        Line::default(),
    ];
    for (i, prompt) in EXAMPLE_PROMPTS.iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(format!(" F{} ", i + 1), key_style),
            Span::raw(" "),
            Span::styled(*prompt, Style::default().fg(Color::Yellow)),
        ]));
        lines.push(Line::default());
    }

    let welcome = Paragraph::new(Text::from(lines))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(welcome, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area and inner size for scroll calculations and mouse hit-testing
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let focused = app.focus == Focus::Transcript;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Hội thoại ({}) ", app.controller.transcript().len()));

    let chat = app.transcript_paragraph();
    app.content_height = u16::try_from(chat.line_count(app.chat_width)).unwrap_or(u16::MAX);
    let chat = chat.block(block).scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_attachment_chip(app: &App, frame: &mut Frame, area: Rect) {
    let Some(pending) = app.controller.pending() else {
        return;
    };

    let icon = if pending.is_image() { "🖼 " } else { "📄" };
    let size = pending
        .size_bytes
        .map(|bytes| format!(" · {}", format_size(bytes)))
        .unwrap_or_default();

    let chip = Line::from(vec![
        Span::styled(
            format!(" {} {} ", icon, pending.file_name),
            Style::default().bg(Color::Cyan).fg(Color::Black),
        ),
        Span::styled(format!(" {}{}", pending.mime_type, size), Style::default().fg(Color::DarkGray)),
        Span::styled("  Ctrl+X bỏ", Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)),
    ]);
    frame.render_widget(Paragraph::new(chip), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.focus == Focus::Input && app.alert.is_none() && app.attach_input.is_none();
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Câu hỏi ");

    let draft = app.controller.draft();
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;

    // Cursor row and column within the draft
    let before: String = draft.chars().take(app.cursor).collect();
    let row = before.matches('\n').count();
    let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);

    // Scroll offsets to keep the cursor visible
    let row_offset = if inner_height == 0 || row < inner_height { 0 } else { row - inner_height + 1 };
    let col_offset = if inner_width == 0 || col < inner_width { 0 } else { col - inner_width + 1 };

    let input = if draft.is_empty() {
        Paragraph::new(INPUT_PLACEHOLDER).style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(draft.to_string())
            .style(Style::default().fg(Color::Cyan))
            .scroll((row_offset as u16, col_offset as u16))
    };
    frame.render_widget(input.block(block), area);

    // Show cursor when editing
    if editing {
        frame.set_cursor_position((
            area.x + 1 + (col - col_offset) as u16,
            area.y + 1 + (row - row_offset) as u16,
        ));
    }
}

fn render_hints(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let (mode_text, mode_style) = match app.focus {
        Focus::Input => (" HỎI ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        Focus::Transcript => (" XEM ", Style::default().bg(Color::Blue).fg(Color::White)),
    };

    let hints = match app.focus {
        Focus::Input => {
            let send_style = if app.controller.can_submit() {
                key_style
            } else {
                key_style.fg(Color::Gray).add_modifier(Modifier::DIM)
            };
            let mut hints = vec![
                Span::styled(" Enter ", send_style),
                Span::styled(" gửi ", label_style),
                Span::styled(" Alt+Enter ", key_style),
                Span::styled(" xuống dòng ", label_style),
                Span::styled(" Ctrl+O ", key_style),
                Span::styled(" đính kèm ", label_style),
            ];
            if app.controller.pending().is_some() {
                hints.extend(vec![
                    Span::styled(" Ctrl+X ", key_style),
                    Span::styled(" bỏ file ", label_style),
                ]);
            }
            if !app.answer_ids().is_empty() {
                hints.extend(vec![
                    Span::styled(" Tab ", key_style),
                    Span::styled(" xem lời giải ", label_style),
                ]);
            }
            hints
        }
        Focus::Transcript => vec![
            Span::styled(" ←/→ 1-3 ", key_style),
            Span::styled(" mục ", label_style),
            Span::styled(" [/] ", key_style),
            Span::styled(" câu trả lời ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" cuộn ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" nhập ", label_style),
        ],
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .chain([Span::styled(" Ctrl+C ", key_style), Span::styled(" thoát ", label_style)])
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Centered popup rectangle of the given size.
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_attach_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 70, 6);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Đính kèm file ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Nhập hoặc dán đường dẫn file. Enter để chọn, Esc để hủy.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let path = app.attach_input.as_deref().unwrap_or_default();

    // Keep the cursor visible on long paths
    let width = input_area.width as usize;
    let offset = if width == 0 || app.attach_cursor < width { 0 } else { app.attach_cursor - width + 1 };
    let visible: String = path.chars().skip(offset).take(width).collect();

    frame.render_widget(Paragraph::new(visible).style(Style::default().fg(Color::Cyan)), input_area);
    frame.set_cursor_position((input_area.x + (app.attach_cursor - offset) as u16, input_area.y));
}

fn render_alert(message: &str, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 56, 5);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Thông báo ");

    let text = Text::from(vec![
        Line::from(Span::styled(message.to_string(), Style::default().fg(Color::Red))),
        Line::from(Span::styled("Nhấn phím bất kỳ để đóng.", Style::default().fg(Color::DarkGray))),
    ]);
    let alert = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(alert, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use math_tutor::{
        ConversationController, Credential, MathResponse, Provider, ResponseRenderer, SolveError,
        SolveRequest, Solver, TypesetEngine, UnicodeTypesetter,
    };
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    struct NeverSolver;

    #[async_trait]
    impl Solver for NeverSolver {
        async fn solve(&self, _request: &SolveRequest) -> Result<MathResponse, SolveError> {
            Err(SolveError::CredentialMissing)
        }

        fn model_id(&self) -> &str {
            "never"
        }
    }

    fn app() -> App {
        let controller = ConversationController::new(Arc::new(NeverSolver), Credential::Absent);
        App::new(
            controller,
            ResponseRenderer::new(TypesetEngine::ready(UnicodeTypesetter::new())),
            Provider::Gemini,
            "gemini-2.5-flash".to_string(),
        )
    }

    fn draw(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_welcome_screen_lists_examples() {
        let mut app = app();
        let screen = draw(&mut app);
        assert!(screen.contains("F1"));
        assert!(screen.contains("Tính diện tích hình tròn"));
        assert!(screen.contains(DISCLAIMER));
        assert!(app.chat_area.is_none());
    }

    #[tokio::test]
    async fn test_failed_turn_renders_apology() {
        let mut app = app();
        app.controller.set_draft("2+2");
        app.controller.submit().await.unwrap();

        let screen = draw(&mut app);
        assert!(screen.contains("Hội thoại (2)"));
        assert!(screen.contains("Xin lỗi"));
        assert!(app.chat_area.is_some());
    }

    #[test]
    fn test_alert_popup_on_top() {
        let mut app = app();
        app.alert = Some(crate::app::ATTACHMENT_ERROR_TEXT.to_string());
        let screen = draw(&mut app);
        assert!(screen.contains("Thông báo"));
        assert!(screen.contains("Lỗi khi xử lý file"));
    }
}
