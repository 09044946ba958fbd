//! Math typesetting for the terminal
//!
//! The renderer talks to a [`Typesetter`] through a shared [`TypesetEngine`]
//! handle that starts out empty and is filled once the engine is ready.
//! [`UnicodeTypesetter`] is the engine shipped with the app: it keeps prose as
//! is (with `**bold**` support) and converts LaTeX inside `$...$`, `$$...$$`,
//! `\(...\)` and `\[...\]` into Unicode.

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use regex::Regex;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesetError {
    #[error("unterminated math delimiter `{0}`")]
    UnterminatedMath(&'static str),
    #[error("unbalanced braces in `{0}`")]
    UnbalancedBraces(String),
    #[error("missing argument for `\\{0}`")]
    MissingArgument(String),
}

pub trait Typesetter: Send + Sync {
    fn typeset(&self, markup: &str) -> Result<Vec<Line<'static>>, TypesetError>;
}

/// Shared handle to the typesetting engine. Clones see the same engine, and
/// the engine can be installed once, after the handle has been handed out.
#[derive(Clone, Default)]
pub struct TypesetEngine {
    slot: Arc<OnceLock<Arc<dyn Typesetter>>>,
}

impl TypesetEngine {
    /// A handle with no engine yet; rendering falls back to raw markup.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(typesetter: impl Typesetter + 'static) -> Self {
        let engine = Self::pending();
        engine.install(typesetter);
        engine
    }

    /// Install the engine. Returns false if one was already installed.
    pub fn install(&self, typesetter: impl Typesetter + 'static) -> bool {
        self.slot.set(Arc::new(typesetter)).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Option<Arc<dyn Typesetter>> {
        self.slot.get().cloned()
    }
}

fn math_style() -> Style {
    Style::default().fg(Color::LightMagenta)
}

fn display_math_style() -> Style {
    math_style().add_modifier(Modifier::BOLD)
}

fn math_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?s)(?P<escaped>\\\$)|\$\$(?P<display>.+?)\$\$|\\\[(?P<bracket>.+?)\\\]|\\\((?P<paren>.+?)\\\)|\$(?P<inline>[^$\n]+?)\$",
        )
        .expect("math delimiter pattern is valid")
    })
}

/// LaTeX-to-Unicode typesetter.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeTypesetter;

impl UnicodeTypesetter {
    pub fn new() -> Self {
        Self
    }
}

impl Typesetter for UnicodeTypesetter {
    fn typeset(&self, markup: &str) -> Result<Vec<Line<'static>>, TypesetError> {
        let mut out = LineBuilder::default();
        let mut last = 0;

        for caps in math_pattern().captures_iter(markup) {
            let Some(whole) = caps.get(0) else { continue };
            out.prose(&markup[last..whole.start()])?;
            last = whole.end();

            if caps.name("escaped").is_some() {
                out.push_span(Span::raw("$"));
            } else if let Some(m) = caps.name("display").or_else(|| caps.name("bracket")) {
                out.display_math(&latex_to_unicode(m.as_str())?);
            } else if let Some(m) = caps.name("inline").or_else(|| caps.name("paren")) {
                out.push_span(Span::styled(latex_to_unicode(m.as_str())?, math_style()));
            }
        }
        out.prose(&markup[last..])?;

        Ok(out.finish())
    }
}

#[derive(Default)]
struct LineBuilder {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    // A display block already ended its line; the next newline is redundant.
    after_display: bool,
}

impl LineBuilder {
    fn push_span(&mut self, span: Span<'static>) {
        self.after_display = false;
        self.current.push(span);
    }

    fn break_line(&mut self) {
        let spans = std::mem::take(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn prose(&mut self, text: &str) -> Result<(), TypesetError> {
        for opener in ["$$", "\\[", "\\("] {
            if text.contains(opener) {
                return Err(TypesetError::UnterminatedMath(opener));
            }
        }

        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                if !(self.after_display && self.current.is_empty()) {
                    self.break_line();
                }
                self.after_display = false;
            }
            if segment.is_empty() {
                continue;
            }
            let segment = if self.current.is_empty() {
                bullet(segment)
            } else {
                segment.to_string()
            };
            self.after_display = false;
            self.current.extend(parse_bold(&segment));
        }
        Ok(())
    }

    fn display_math(&mut self, math: &str) {
        if !self.current.is_empty() {
            self.break_line();
        }
        for row in math.split('\n') {
            let row = row.trim();
            if !row.is_empty() {
                self.lines.push(Line::from(Span::styled(format!("    {}", row), display_math_style())));
            }
        }
        self.after_display = true;
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if !self.current.is_empty() {
            self.break_line();
        }
        self.lines
    }
}

/// Markdown list markers at the start of a line become bullets.
fn bullet(segment: &str) -> String {
    let indent = segment.len() - segment.trim_start().len();
    let rest = &segment[indent..];
    match rest.strip_prefix("* ").or_else(|| rest.strip_prefix("- ")) {
        Some(item) => format!("{}• {}", &segment[..indent], item),
        None => segment.to_string(),
    }
}

/// Split prose into spans, turning `**bold**` into bold spans.
fn parse_bold(text: &str) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }
    spans
}

/// Convert the body of a math region to Unicode text.
pub fn latex_to_unicode(src: &str) -> Result<String, TypesetError> {
    let mut parser = MathParser {
        src,
        chars: src.chars().collect(),
        pos: 0,
    };
    let out = parser.sequence(false)?;
    Ok(out.trim().to_string())
}

struct MathParser<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl MathParser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn unbalanced(&self) -> TypesetError {
        TypesetError::UnbalancedBraces(self.src.to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Parse until end of input, or until the closing `}` of a group.
    fn sequence(&mut self, in_group: bool) -> Result<String, TypesetError> {
        let mut out = String::new();

        loop {
            let Some(c) = self.peek() else {
                if in_group {
                    return Err(self.unbalanced());
                }
                return Ok(out);
            };

            match c {
                '}' => {
                    if !in_group {
                        return Err(self.unbalanced());
                    }
                    self.pos += 1;
                    return Ok(out);
                }
                '{' => {
                    self.pos += 1;
                    out.push_str(&self.sequence(true)?);
                }
                '\\' => out.push_str(&self.command()?),
                '^' => {
                    self.pos += 1;
                    let arg = self.argument("^")?;
                    out.push_str(&script(&arg, superscript, '^'));
                }
                '_' => {
                    self.pos += 1;
                    let arg = self.argument("_")?;
                    out.push_str(&script(&arg, subscript, '_'));
                }
                '&' => {
                    self.pos += 1;
                    out.push(' ');
                }
                c if c.is_whitespace() => {
                    self.skip_whitespace();
                    if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
                        out.push(' ');
                    }
                }
                c => {
                    self.pos += 1;
                    out.push(c);
                }
            }
        }
    }

    /// One argument: a braced group, a single command, or a single character.
    fn argument(&mut self, owner: &str) -> Result<String, TypesetError> {
        self.skip_whitespace();
        match self.peek() {
            None | Some('}') => Err(TypesetError::MissingArgument(owner.to_string())),
            Some('{') => {
                self.pos += 1;
                self.sequence(true)
            }
            Some('\\') => self.command(),
            Some(_) => Ok(self.bump().map(String::from).unwrap_or_default()),
        }
    }

    fn optional_argument(&mut self) -> Result<Option<String>, TypesetError> {
        if self.peek() != Some('[') {
            return Ok(None);
        }
        self.pos += 1;
        let mut inner = String::new();
        loop {
            match self.bump() {
                Some(']') => break,
                Some(c) => inner.push(c),
                None => return Err(self.unbalanced()),
            }
        }
        latex_to_unicode(&inner).map(Some)
    }

    fn command(&mut self) -> Result<String, TypesetError> {
        // Leading backslash.
        self.pos += 1;

        let mut name = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
            name.push(c);
            self.pos += 1;
        }

        if name.is_empty() {
            let Some(c) = self.bump() else {
                return Ok("\\".to_string());
            };
            return Ok(match c {
                '\\' => "\n".to_string(),
                ',' | ';' | ':' | ' ' => " ".to_string(),
                '!' => String::new(),
                '|' => "‖".to_string(),
                other => other.to_string(),
            });
        }

        let out = match name.as_str() {
            "frac" | "dfrac" | "tfrac" => {
                let num = self.argument(&name)?;
                let den = self.argument(&name)?;
                format!("{}/{}", wrap(&num), wrap(&den))
            }
            "sqrt" => {
                let index = self.optional_argument()?;
                let radicand = self.argument(&name)?;
                let root = match index {
                    Some(n) => format!("{}√", script(&n, superscript, '^')),
                    None => "√".to_string(),
                };
                format!("{}{}", root, wrap(&radicand))
            }
            "text" | "textrm" | "textbf" | "textit" | "mathrm" | "mathbf" | "mathit" | "mbox"
            | "operatorname" | "boldsymbol" => self.argument(&name)?,
            "mathbb" => self.argument(&name)?.chars().map(double_struck).collect(),
            "overline" | "bar" => combine(&self.argument(&name)?, '\u{0305}'),
            "vec" | "overrightarrow" => combine(&self.argument(&name)?, '\u{20D7}'),
            "hat" | "widehat" => combine(&self.argument(&name)?, '\u{0302}'),
            "begin" | "end" => {
                // Environment names carry no content of their own.
                self.argument(&name)?;
                String::new()
            }
            "left" | "right" => {
                if self.peek() == Some('.') {
                    self.pos += 1;
                }
                String::new()
            }
            "big" | "Big" | "bigg" | "Bigg" | "bigl" | "bigr" | "Bigl" | "Bigr" | "displaystyle"
            | "textstyle" | "limits" | "nolimits" => String::new(),
            "quad" => "  ".to_string(),
            "qquad" => "    ".to_string(),
            other => symbol(other).map(str::to_string).unwrap_or_else(|| other.to_string()),
        };
        Ok(out)
    }
}

fn wrap(s: &str) -> String {
    let s = s.trim();
    let simple = s.chars().count() == 1 || s.chars().all(|c| c.is_ascii_digit() || c == '.');
    if simple {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

fn combine(base: &str, mark: char) -> String {
    base.chars().flat_map(|c| [c, mark]).collect()
}

/// Map every character of a script, or fall back to `^(...)` notation.
fn script(arg: &str, map: fn(char) -> Option<char>, marker: char) -> String {
    let arg = arg.trim();
    let mapped: Option<String> = arg
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { Some(c) } else { map(c) })
        .collect();
    match mapped {
        Some(s) if !s.is_empty() => s,
        _ if arg.chars().count() == 1 => format!("{}{}", marker, arg),
        _ => format!("{}({})", marker, arg),
    }
}

fn superscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' | '−' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        '∘' | '°' => '°',
        '′' | '\'' => '′',
        'a' => 'ᵃ',
        'b' => 'ᵇ',
        'c' => 'ᶜ',
        'd' => 'ᵈ',
        'e' => 'ᵉ',
        'f' => 'ᶠ',
        'g' => 'ᵍ',
        'h' => 'ʰ',
        'i' => 'ⁱ',
        'j' => 'ʲ',
        'k' => 'ᵏ',
        'l' => 'ˡ',
        'm' => 'ᵐ',
        'n' => 'ⁿ',
        'o' => 'ᵒ',
        'p' => 'ᵖ',
        'r' => 'ʳ',
        's' => 'ˢ',
        't' => 'ᵗ',
        'u' => 'ᵘ',
        'v' => 'ᵛ',
        'w' => 'ʷ',
        'x' => 'ˣ',
        'y' => 'ʸ',
        'z' => 'ᶻ',
        'T' => 'ᵀ',
        _ => return None,
    })
}

fn subscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' | '−' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'h' => 'ₕ',
        'i' => 'ᵢ',
        'j' => 'ⱼ',
        'k' => 'ₖ',
        'l' => 'ₗ',
        'm' => 'ₘ',
        'n' => 'ₙ',
        'o' => 'ₒ',
        'p' => 'ₚ',
        'r' => 'ᵣ',
        's' => 'ₛ',
        't' => 'ₜ',
        'u' => 'ᵤ',
        'v' => 'ᵥ',
        'x' => 'ₓ',
        _ => return None,
    })
}

fn double_struck(c: char) -> char {
    match c {
        'R' => 'ℝ',
        'N' => 'ℕ',
        'Z' => 'ℤ',
        'Q' => 'ℚ',
        'C' => 'ℂ',
        'P' => 'ℙ',
        other => other,
    }
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        // Greek
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" => "ϵ",
        "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" => "θ",
        "vartheta" => "ϑ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" => "ϕ",
        "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",

        // Operators and relations
        "times" => "×",
        "cdot" | "cdotp" => "·",
        "div" => "÷",
        "pm" => "±",
        "mp" => "∓",
        "ast" => "∗",
        "star" => "⋆",
        "circ" => "∘",
        "bullet" => "•",
        "le" | "leq" | "leqslant" => "≤",
        "ge" | "geq" | "geqslant" => "≥",
        "lt" => "<",
        "gt" => ">",
        "neq" | "ne" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "sim" => "∼",
        "simeq" => "≃",
        "cong" => "≅",
        "propto" => "∝",
        "infty" => "∞",

        // Arrows and logic
        "to" | "rightarrow" => "→",
        "leftarrow" | "gets" => "←",
        "Rightarrow" | "implies" => "⇒",
        "Leftarrow" => "⇐",
        "Leftrightarrow" | "iff" => "⇔",
        "leftrightarrow" => "↔",
        "mapsto" => "↦",
        "forall" => "∀",
        "exists" => "∃",
        "neg" | "lnot" => "¬",
        "land" | "wedge" => "∧",
        "lor" | "vee" => "∨",
        "therefore" => "∴",
        "because" => "∵",

        // Sets
        "in" => "∈",
        "notin" => "∉",
        "ni" => "∋",
        "subset" => "⊂",
        "subseteq" => "⊆",
        "supset" => "⊃",
        "supseteq" => "⊇",
        "cup" => "∪",
        "cap" => "∩",
        "setminus" => "∖",
        "emptyset" | "varnothing" => "∅",

        // Big operators and calculus
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "iint" => "∬",
        "oint" => "∮",
        "partial" => "∂",
        "nabla" => "∇",

        // Geometry
        "angle" => "∠",
        "triangle" => "△",
        "perp" => "⊥",
        "parallel" => "∥",
        "degree" => "°",
        "prime" => "′",

        // Delimiters and dots
        "mid" | "vert" | "lvert" | "rvert" => "|",
        "langle" => "⟨",
        "rangle" => "⟩",
        "lfloor" => "⌊",
        "rfloor" => "⌋",
        "lceil" => "⌈",
        "rceil" => "⌉",
        "ldots" | "dots" => "…",
        "cdots" => "⋯",
        "vdots" => "⋮",

        // Letters
        "hbar" => "ℏ",
        "ell" => "ℓ",
        "aleph" => "ℵ",
        _ => return None,
    })
}
