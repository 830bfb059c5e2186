// Renderer that writes widget updates to the log
use tokio::sync::watch;

use crate::application::renderer::Renderer;
use crate::domain::display::{DisplayResult, GlucoseLevel};
use crate::infrastructure::config::AppConfig;

pub struct LogRenderer {
    settings: watch::Receiver<AppConfig>,
}

impl LogRenderer {
    pub fn new(settings: watch::Receiver<AppConfig>) -> Self {
        Self { settings }
    }
}

/// Decode a `&#NNNN;` reference back into its character.
fn entity_to_char(entity: &str) -> Option<char> {
    entity
        .strip_prefix("&#")?
        .strip_suffix(';')?
        .parse::<u32>()
        .ok()
        .and_then(char::from_u32)
}

/// One-line summary, e.g. `5.0 +0.6 ↗ (3 min)`.
pub fn format_line(result: &DisplayResult, show_age: bool) -> String {
    let mut line = result.last.clone();
    if let Some(delta) = &result.delta {
        line.push(' ');
        line.push_str(delta);
    }
    line.push(' ');
    line.push(entity_to_char(&result.direction).unwrap_or('-'));
    if show_age {
        line.push_str(&format!(" ({} min)", result.age));
    }
    line
}

impl Renderer for LogRenderer {
    fn on_data(&self, result: &DisplayResult) {
        let show_age = self.settings.borrow().widget.show_age;
        let line = format_line(result, show_age);
        let trend = result.trend.map(|t| t.label()).unwrap_or("-");
        match result.level {
            GlucoseLevel::Critical => tracing::warn!(level = ?result.level, trend, "{}", line),
            GlucoseLevel::Stale => tracing::warn!(level = ?result.level, trend, "{} - reading is stale", line),
            GlucoseLevel::Warning | GlucoseLevel::Ok => tracing::info!(level = ?result.level, trend, "{}", line),
        }
    }

    fn on_error(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn on_alert(&self, message: &str) {
        tracing::error!("Nightscout is not answering: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::Direction;

    fn result(delta: Option<&str>) -> DisplayResult {
        DisplayResult {
            last: "5.0".to_string(),
            delta: delta.map(String::from),
            trend: Some(Direction::FortyFiveUp),
            direction: "&#8599;".to_string(),
            age: 3,
            level: GlucoseLevel::Ok,
        }
    }

    #[test]
    fn test_entity_to_char() {
        assert_eq!(entity_to_char("&#8599;"), Some('↗'));
        assert_eq!(entity_to_char("&#45;"), Some('-'));
        assert_eq!(entity_to_char("8599"), None);
    }

    #[test]
    fn test_format_line() {
        assert_eq!(format_line(&result(Some("+0.6")), true), "5.0 +0.6 ↗ (3 min)");
        assert_eq!(format_line(&result(Some("+0.6")), false), "5.0 +0.6 ↗");
        assert_eq!(format_line(&result(None), false), "5.0 ↗");
    }
}
