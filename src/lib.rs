//! telecon - operator console core for remote messaging-account sessions.
//!
//! The crate drives a multi-step credential-verification protocol against a
//! backend that holds third-party account sessions, then offers a catalogue
//! of per-session operations (exports, pattern search, balance discovery,
//! email/2FA mutation) with a single-flight guard, background polling, and
//! a paginated pattern browser on top.

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod notify;
pub mod patterns;
pub mod poll;

pub use config::Config;
pub use error::{Error, Result};
