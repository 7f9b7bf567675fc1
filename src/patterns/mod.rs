//! Pattern-search browsing over a previously computed index.

pub mod browser;

pub use browser::{BundleState, PatternBrowser};
