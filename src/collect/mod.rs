//! Scraping layer: portal adapters, posting model, title scoring

pub mod adapters;
pub mod collector;
pub mod posting;
pub mod scoring;
