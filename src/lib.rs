pub mod computations;
pub mod config;
pub mod core;
pub mod engine;
pub mod hub;
pub mod listener;
pub mod logging;
pub mod observability;
pub mod protocol;
pub mod resilience;
pub mod service;
pub mod storage;
pub mod track;
