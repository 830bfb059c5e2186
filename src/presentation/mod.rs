// Presentation layer - Renderers for poll results
pub mod log_renderer;
