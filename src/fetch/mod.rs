mod orchestrator;
mod strategy;

pub use orchestrator::FetchOrchestrator;
pub use strategy::{CurlStrategy, FetchStrategy, FetchedPage, HttpStrategy, StrategyKind};
