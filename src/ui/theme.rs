use owo_colors::Style;
use std::io::IsTerminal;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for CLI output; every style is a no-op when color is off.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
}

impl Theme {
    pub fn new(color: bool) -> Self {
        let pick = |style: Style| if color { style } else { Style::new() };
        Self {
            header: pick(Style::new().cyan().bold()),
            success: pick(Style::new().green().bold()),
            error: pick(Style::new().red().bold()),
            warn: pick(Style::new().yellow().bold()),
            info: pick(Style::new().magenta()),
            dim: pick(Style::new().dimmed()),
        }
    }
}

/// Color only when stdout is a terminal and `NO_COLOR` is unset.
pub fn theme() -> &'static Theme {
    THEME.get_or_init(|| Theme::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()))
}
