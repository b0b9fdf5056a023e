pub mod alerts;
pub mod export;
pub mod grid;
pub mod history;
pub mod orchestrator;
pub mod scheduler;
pub mod session;
pub mod shift;
