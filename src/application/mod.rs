// Application layer - Token handling, fetch orchestration and polling
pub mod error;
#[cfg(test)]
pub mod mock_transport;
pub mod nightscout_client;
pub mod poll_service;
pub mod renderer;
pub mod token_manager;
pub mod transport;
