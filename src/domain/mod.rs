// Domain layer - Glucose samples and pure display calculations
pub mod display;
pub mod sample;
pub mod trend;
