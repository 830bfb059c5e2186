// Rendering port - receives every poll outcome
use crate::domain::display::DisplayResult;

pub trait Renderer: Send + Sync {
    fn on_data(&self, result: &DisplayResult);

    /// Called for every failed poll.
    fn on_error(&self, message: &str);

    /// Called once per failure episode, after `retry_count` consecutive failures.
    fn on_alert(&self, message: &str);
}
