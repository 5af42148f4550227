pub mod adapters;
pub mod adapters_try;
pub mod cancel;
pub mod chain;
pub(crate) mod config;
pub mod executor;
pub mod retry;
pub mod send;
pub mod stage;
