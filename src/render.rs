use ratatui::text::{Line, Text};

use crate::typeset::TypesetEngine;

/// Render target for one piece of markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Surface {
    lines: Vec<Line<'static>>,
    typeset: bool,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[Line<'static>] {
        &self.lines
    }

    pub fn is_typeset(&self) -> bool {
        self.typeset
    }

    pub fn to_text(&self) -> Text<'static> {
        Text::from(self.lines.clone())
    }

    fn replace_raw(&mut self, markup: &str) {
        self.lines = markup.lines().map(|l| Line::raw(l.to_string())).collect();
        self.typeset = false;
    }
}

/// Writes markup onto a surface and typesets it when the engine is ready.
#[derive(Clone)]
pub struct ResponseRenderer {
    engine: TypesetEngine,
}

impl ResponseRenderer {
    pub fn new(engine: TypesetEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TypesetEngine {
        &self.engine
    }

    /// Replace everything on `surface` with `markup`. Previous content never
    /// survives, so rendering the same string twice equals rendering it once.
    pub fn render(&self, markup: &str, surface: &mut Surface) {
        surface.replace_raw(markup);

        let Some(typesetter) = self.engine.get() else {
            return;
        };

        match typesetter.typeset(markup) {
            Ok(lines) => {
                surface.lines = lines;
                surface.typeset = true;
            }
            Err(err) => {
                tracing::warn!(error = %err, "typesetting failed, showing raw markup");
            }
        }
    }

    /// Convenience for one-off rendering into a fresh surface.
    pub fn render_lines(&self, markup: &str) -> Vec<Line<'static>> {
        let mut surface = Surface::new();
        self.render(markup, &mut surface);
        surface.lines
    }
}
