use crossterm::style::{Color, Stylize};

#[derive(Clone)]
pub struct Theme {
    pub name: &'static str,
    /// When false every `paint` call returns the text unchanged.
    pub enabled: bool,
    pub accent: Color,
    pub muted: Color,
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub user_color: Color,
    pub assistant_color: Color,
    pub system_color: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            name: "dark",
            enabled: true,
            accent: Color::Cyan,
            muted: Color::DarkGrey,
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            user_color: Color::Cyan,
            assistant_color: Color::Green,
            system_color: Color::Yellow,
        }
    }

    pub fn plain() -> Self {
        Self {
            name: "plain",
            enabled: false,
            ..Self::dark()
        }
    }

    /// Colors are on unless `--no-color` was given or `NO_COLOR` is set.
    pub fn detect(no_color_flag: bool) -> Self {
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if no_color_flag || no_color_env {
            Self::plain()
        } else {
            Self::dark()
        }
    }

    pub fn paint(&self, text: impl AsRef<str>, color: Color) -> String {
        let text = text.as_ref();
        if self.enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn bold(&self, text: impl AsRef<str>, color: Color) -> String {
        let text = text.as_ref();
        if self.enabled {
            text.with(color).bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn role_color(&self, role: grokchat_core::Role) -> Color {
        match role {
            grokchat_core::Role::User => self.user_color,
            grokchat_core::Role::Assistant => self.assistant_color,
            grokchat_core::Role::System => self.system_color,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
