use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Paragraph, Wrap};
use tokio::task::AbortHandle;

use math_tutor::presenter::{self, ASSISTANT_NAME};
use math_tutor::{
    ConversationController, MathResponse, MessageId, Provider, ResponseRenderer, SolutionTab,
    SolveError, TabStates,
};

/// Shown when the staged file cannot be read.
pub const ATTACHMENT_ERROR_TEXT: &str = "Lỗi khi xử lý file. Vui lòng thử lại.";

/// Example prompts offered on the welcome screen (F1, F2).
pub const EXAMPLE_PROMPTS: [&str; 2] = [
    "Giải phương trình: $x^2 - 5x + 6 = 0$",
    "Tính diện tích hình tròn có bán kính R=5cm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Transcript,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: Focus,
    pub controller: ConversationController,
    pub provider: Provider,
    pub model: String,

    // Presentation state
    pub tabs: TabStates,
    pub renderer: ResponseRenderer,
    pub focused_bubble: Option<MessageId>,

    // Draft cursor, as a char index into the controller's draft
    pub cursor: usize,

    // Transcript viewport
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    // Wrapped rows as of the last draw or append
    pub content_height: u16,
    pub chat_area: Option<Rect>,

    // Popups
    pub attach_input: Option<String>,
    pub attach_cursor: usize,
    pub alert: Option<String>,

    // In-flight solve task
    pub solve_task: Option<AbortHandle>,
    pub animation_frame: u8,
}

impl App {
    pub fn new(
        controller: ConversationController,
        renderer: ResponseRenderer,
        provider: Provider,
        model: String,
    ) -> Self {
        Self {
            should_quit: false,
            focus: Focus::Input,
            controller,
            provider,
            model,
            tabs: TabStates::default(),
            renderer,
            focused_bubble: None,
            cursor: 0,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            content_height: 0,
            chat_area: None,
            attach_input: None,
            attach_cursor: 0,
            alert: None,
            solve_task: None,
            animation_frame: 0,
        }
    }

    pub fn tick_animation(&mut self) {
        if self.controller.is_submitting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Every transcript line, bubbles separated by a blank line, followed by
    /// the thinking indicator while a request is in flight.
    pub fn transcript_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        for message in self.controller.transcript() {
            let focused = self.focus == Focus::Transcript && self.focused_bubble == Some(message.id);
            lines.extend(presenter::present(
                message,
                self.tabs.get(message.id),
                focused,
                &self.renderer,
            ));
            lines.push(Line::default());
        }

        if self.controller.is_submitting() {
            lines.push(Line::from(Span::styled(
                format!("🤖 {}", ASSISTANT_NAME),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((self.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Đang suy nghĩ{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        lines
    }

    /// The transcript as the chat pane draws it, without the border.
    pub fn transcript_paragraph(&self) -> Paragraph<'static> {
        Paragraph::new(Text::from(self.transcript_lines())).wrap(Wrap { trim: false })
    }

    /// Wrapped row count of the transcript at the current chat width.
    fn measure_transcript(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };
        let rows = self.transcript_paragraph().line_count(wrap_width);
        u16::try_from(rows).unwrap_or(u16::MAX)
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    fn max_scroll(&self) -> u16 {
        self.content_height.saturating_sub(self.visible_height())
    }

    /// Scroll chat to bottom so the latest bubble is visible
    pub fn scroll_to_bottom(&mut self) {
        self.content_height = self.measure_transcript();
        self.scroll = self.max_scroll();
    }

    pub fn scroll_down(&mut self, rows: u16) {
        self.scroll = self.scroll.saturating_add(rows).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.scroll = self.scroll.saturating_sub(rows);
    }

    pub fn half_page(&self) -> u16 {
        (self.visible_height() / 2).max(1)
    }

    /// Ids of the answer bubbles that have tabs, oldest first.
    pub fn answer_ids(&self) -> Vec<MessageId> {
        self.controller
            .transcript()
            .iter()
            .filter(|message| message.data().is_some())
            .map(|message| message.id)
            .collect()
    }

    /// Focus the transcript, defaulting to the latest answer.
    pub fn focus_transcript(&mut self) {
        self.focus = Focus::Transcript;
        let answers = self.answer_ids();
        if self.focused_bubble.map_or(true, |id| !answers.contains(&id)) {
            self.focused_bubble = answers.last().copied();
        }
    }

    /// Move bubble focus by `step` answers, clamped to the ends.
    pub fn move_bubble_focus(&mut self, step: isize) {
        let answers = self.answer_ids();
        if answers.is_empty() {
            return;
        }
        let current = self
            .focused_bubble
            .and_then(|id| answers.iter().position(|a| *a == id))
            .unwrap_or(answers.len() - 1);
        let next = current.saturating_add_signed(step).min(answers.len() - 1);
        self.focused_bubble = Some(answers[next]);
    }

    pub fn next_tab(&mut self) {
        if let Some(id) = self.focused_bubble {
            self.tabs.next(id);
        }
    }

    pub fn prev_tab(&mut self) {
        if let Some(id) = self.focused_bubble {
            self.tabs.prev(id);
        }
    }

    pub fn select_tab(&mut self, tab: SolutionTab) {
        if let Some(id) = self.focused_bubble {
            self.tabs.set(id, tab);
        }
    }

    /// Apply the settled result of the solve task.
    pub fn finish_solve(&mut self, outcome: Result<MathResponse, SolveError>) {
        self.solve_task = None;
        if let Some(id) = self.controller.complete(outcome) {
            if self.controller.transcript().last().and_then(|m| m.data()).is_some() {
                self.focused_bubble = Some(id);
            }
            self.scroll_to_bottom();
        }
    }

    /// Fill the draft with one of the welcome-screen examples.
    pub fn use_example(&mut self, index: usize) {
        if let Some(prompt) = EXAMPLE_PROMPTS.get(index) {
            self.controller.set_draft(*prompt);
            self.cursor = prompt.chars().count();
            self.focus = Focus::Input;
        }
    }

    /// Stop the in-flight solve task and leave the loop.
    pub fn quit(&mut self) {
        if let Some(task) = self.solve_task.take() {
            task.abort();
        }
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use math_tutor::{Credential, SolveRequest, Solver, TypesetEngine, UnicodeTypesetter};
    use std::sync::Arc;

    struct FixedSolver;

    #[async_trait]
    impl Solver for FixedSolver {
        async fn solve(&self, _request: &SolveRequest) -> Result<MathResponse, SolveError> {
            Ok(answer())
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    fn answer() -> MathResponse {
        MathResponse {
            theory: "Định lý Vi-ét".to_string(),
            hint: "Tính $\\Delta$".to_string(),
            solution: "$x = 2$ hoặc $x = 3$".to_string(),
        }
    }

    fn app() -> App {
        let controller = ConversationController::new(Arc::new(FixedSolver), Credential::Absent);
        let renderer = ResponseRenderer::new(TypesetEngine::ready(UnicodeTypesetter::new()));
        App::new(controller, renderer, Provider::Gemini, "fixed".to_string())
    }

    async fn ask(app: &mut App, text: &str, outcome: Result<MathResponse, SolveError>) {
        app.controller.set_draft(text);
        app.controller.begin_submit().await.unwrap().unwrap();
        app.finish_solve(outcome);
    }

    #[tokio::test]
    async fn test_finish_solve_focuses_new_answer() {
        let mut app = app();
        ask(&mut app, "1 + 1", Ok(answer())).await;

        let last = app.controller.transcript().last().unwrap().id;
        assert_eq!(app.focused_bubble, Some(last));
        assert!(!app.controller.is_submitting());
    }

    #[tokio::test]
    async fn test_failed_answer_keeps_previous_focus() {
        let mut app = app();
        ask(&mut app, "1 + 1", Ok(answer())).await;
        let first = app.focused_bubble;

        ask(&mut app, "2 + 2", Err(SolveError::CredentialMissing)).await;
        assert_eq!(app.focused_bubble, first);
        assert_eq!(app.answer_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_tab_keys_only_touch_focused_bubble() {
        let mut app = app();
        ask(&mut app, "a", Ok(answer())).await;
        ask(&mut app, "b", Ok(answer())).await;
        let ids = app.answer_ids();

        app.focus_transcript();
        app.next_tab();
        assert_eq!(app.tabs.get(ids[1]), SolutionTab::Hint);
        assert_eq!(app.tabs.get(ids[0]), SolutionTab::Theory);

        app.move_bubble_focus(-1);
        app.select_tab(SolutionTab::Solution);
        assert_eq!(app.tabs.get(ids[0]), SolutionTab::Solution);
        assert_eq!(app.tabs.get(ids[1]), SolutionTab::Hint);

        app.move_bubble_focus(-5);
        assert_eq!(app.focused_bubble, Some(ids[0]));
        app.move_bubble_focus(5);
        assert_eq!(app.focused_bubble, Some(ids[1]));
    }

    #[tokio::test]
    async fn test_thinking_indicator_while_submitting() {
        let mut app = app();
        app.controller.set_draft("x");
        app.controller.begin_submit().await.unwrap();

        let text: String = app
            .transcript_lines()
            .iter()
            .flat_map(|line| line.spans.iter().map(|s| s.content.to_string()))
            .collect();
        assert!(text.contains("Đang suy nghĩ."));

        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
    }

    #[test]
    fn test_use_example_fills_draft() {
        let mut app = app();
        app.focus = Focus::Transcript;
        app.use_example(1);
        assert_eq!(app.controller.draft(), EXAMPLE_PROMPTS[1]);
        assert_eq!(app.cursor, EXAMPLE_PROMPTS[1].chars().count());
        assert_eq!(app.focus, Focus::Input);

        app.use_example(7);
        assert_eq!(app.controller.draft(), EXAMPLE_PROMPTS[1]);
    }

    #[tokio::test]
    async fn test_scroll_to_bottom_with_small_viewport() {
        let mut app = app();
        app.chat_height = 3;
        app.chat_width = 40;
        ask(&mut app, "một\nhai\nba\nbốn", Ok(answer())).await;

        assert!(app.scroll > 0);
        let bottom = app.scroll;
        app.scroll_down(10);
        assert_eq!(app.scroll, bottom);
        app.scroll_up(100);
        assert_eq!(app.scroll, 0);
    }

    #[tokio::test]
    async fn test_scroll_to_bottom_counts_word_wrapped_rows() {
        let mut app = app();
        app.chat_height = 1;
        app.chat_width = 12;
        app.controller.set_draft("aaaaaa bbbbbb cccccc");
        app.controller.begin_submit().await.unwrap();
        app.scroll_to_bottom();

        // "▌ aaaaaa bbbbbb cccccc" is 22 columns: two rows by width, three by words
        let rows = Paragraph::new(Text::from(app.transcript_lines()))
            .wrap(Wrap { trim: false })
            .line_count(12) as u16;
        assert_eq!(app.content_height, rows);
        assert_eq!(app.scroll, rows - 1);
    }

    #[test]
    fn test_scroll_keys_use_measured_height() {
        let mut app = app();
        app.chat_height = 5;
        app.content_height = 12;

        app.scroll_down(100);
        assert_eq!(app.scroll, 7);
        app.scroll_up(3);
        assert_eq!(app.scroll, 4);
    }
}
