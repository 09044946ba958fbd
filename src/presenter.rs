//! Message bubbles
//!
//! Turns one transcript entry into styled lines. Which section of an answer
//! is showing is presentation state, kept in [`TabStates`] by message id and
//! never stored in the transcript.

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use std::collections::HashMap;

use crate::attachment::format_size;
use crate::render::ResponseRenderer;
use crate::state::{MathResponse, Message, MessageBody, MessageId, Reply, UserAttachment, FAILED_REPLY_TEXT};

pub const ASSISTANT_NAME: &str = "ĐM Bài tập về nhà";
pub const USER_NAME: &str = "Học sinh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolutionTab {
    #[default]
    Theory,
    Hint,
    Solution,
}

impl SolutionTab {
    pub const ALL: [SolutionTab; 3] = [SolutionTab::Theory, SolutionTab::Hint, SolutionTab::Solution];

    pub fn label(self) -> &'static str {
        match self {
            SolutionTab::Theory => "1. Kiến thức",
            SolutionTab::Hint => "2. Hướng dẫn",
            SolutionTab::Solution => "3. Lời giải",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            SolutionTab::Theory => "Kiến thức liên quan",
            SolutionTab::Hint => "Hướng dẫn giải nhanh",
            SolutionTab::Solution => "Lời giải chi tiết",
        }
    }

    fn accent(self) -> Color {
        match self {
            SolutionTab::Theory => Color::Blue,
            SolutionTab::Hint => Color::Magenta,
            SolutionTab::Solution => Color::Green,
        }
    }

    pub fn section(self, data: &MathResponse) -> &str {
        match self {
            SolutionTab::Theory => &data.theory,
            SolutionTab::Hint => &data.hint,
            SolutionTab::Solution => &data.solution,
        }
    }

    /// Tab for a 1-based number key.
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(SolutionTab::Theory),
            2 => Some(SolutionTab::Hint),
            3 => Some(SolutionTab::Solution),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            SolutionTab::Theory => SolutionTab::Hint,
            SolutionTab::Hint => SolutionTab::Solution,
            SolutionTab::Solution => SolutionTab::Theory,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SolutionTab::Theory => SolutionTab::Solution,
            SolutionTab::Hint => SolutionTab::Theory,
            SolutionTab::Solution => SolutionTab::Hint,
        }
    }
}

/// Active tab per answer bubble. Missing entries are on the first tab.
#[derive(Debug, Clone, Default)]
pub struct TabStates {
    active: HashMap<MessageId, SolutionTab>,
}

impl TabStates {
    pub fn get(&self, id: MessageId) -> SolutionTab {
        self.active.get(&id).copied().unwrap_or_default()
    }

    pub fn set(&mut self, id: MessageId, tab: SolutionTab) {
        self.active.insert(id, tab);
    }

    pub fn next(&mut self, id: MessageId) {
        let tab = self.get(id).next();
        self.set(id, tab);
    }

    pub fn prev(&mut self, id: MessageId) {
        let tab = self.get(id).prev();
        self.set(id, tab);
    }

    pub fn reset(&mut self) {
        self.active.clear();
    }
}

/// Render one message. `focused` marks the bubble that tab keys act on.
pub fn present(
    message: &Message,
    tab: SolutionTab,
    focused: bool,
    renderer: &ResponseRenderer,
) -> Vec<Line<'static>> {
    match &message.body {
        MessageBody::User { text, attachment } => user_bubble(text, attachment.as_ref()),
        MessageBody::Assistant(Reply::Failed) => error_bubble(),
        MessageBody::Assistant(Reply::Solved(data)) => answer_bubble(data, tab, focused, renderer),
    }
}

fn user_bubble(text: &str, attachment: Option<&UserAttachment>) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!("▌ {}", USER_NAME),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))];

    if let Some(file) = attachment {
        lines.push(attachment_line(file));
    }

    // Keep blank lines the user typed.
    for line in text.split('\n') {
        lines.push(Line::from(vec![
            Span::styled("▌ ", Style::default().fg(Color::Cyan)),
            Span::raw(line.to_string()),
        ]));
    }
    lines
}

fn attachment_line(file: &UserAttachment) -> Line<'static> {
    let bar = Span::styled("▌ ", Style::default().fg(Color::Cyan));
    if file.is_image() {
        Line::from(vec![
            bar,
            Span::styled(
                " 🖼  Ảnh ",
                Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" {} ", file.file_name),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{} · {}", file.mime_type, format_size(file.size_bytes)),
                Style::default().fg(Color::DarkGray),
            ),
        ])
    } else {
        Line::from(vec![
            bar,
            Span::styled(
                format!(" 📄 {} ", file.file_name),
                Style::default().bg(Color::DarkGray).fg(Color::White),
            ),
        ])
    }
}

fn assistant_header(focused: bool) -> Line<'static> {
    let mut spans = vec![Span::styled(
        format!("🤖 {}", ASSISTANT_NAME),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];
    if focused {
        spans.push(Span::styled(
            "  ◀ ←/→ đổi mục",
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn error_bubble() -> Vec<Line<'static>> {
    let panel = Style::default().fg(Color::Red);
    vec![
        assistant_header(false),
        Line::from(vec![
            Span::styled("┃ ", panel),
            Span::styled(format!("⚠ {}", FAILED_REPLY_TEXT), panel),
        ]),
    ]
}

fn answer_bubble(
    data: &MathResponse,
    active: SolutionTab,
    focused: bool,
    renderer: &ResponseRenderer,
) -> Vec<Line<'static>> {
    let mut lines = vec![assistant_header(focused)];

    let mut tab_bar = Vec::new();
    for (i, tab) in SolutionTab::ALL.into_iter().enumerate() {
        if i > 0 {
            tab_bar.push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
        }
        let style = if tab == active {
            Style::default().bg(tab.accent()).fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        tab_bar.push(Span::styled(format!(" {} ", tab.label()), style));
    }
    lines.push(Line::from(tab_bar));

    let accent = Style::default().fg(active.accent());
    lines.push(Line::from(Span::styled(
        active.heading().to_string(),
        accent.add_modifier(Modifier::BOLD),
    )));

    // Hint and solution bodies get a coloured gutter.
    let gutter = match active {
        SolutionTab::Theory => "  ",
        SolutionTab::Hint => "┃ ",
        SolutionTab::Solution => "│ ",
    };
    for mut line in renderer.render_lines(active.section(data)) {
        line.spans.insert(0, Span::styled(gutter, accent));
        lines.push(line);
    }
    lines
}
