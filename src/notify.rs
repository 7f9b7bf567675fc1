//! User-notification seams.
//!
//! The console never talks to a toast/UI layer directly: every component
//! reports through `Notifier` and asks questions through `ConfirmPrompt`.
//! The binary wires terminal implementations; tests substitute recorders.

use std::io::Write;

/// Terminal fire-and-forget notifications (the toast surface).
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Yes/no confirmation for destructive or recovery actions.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Plain stdout notifier for the interactive console.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        println!("\x1b[90m· {message}\x1b[0m");
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m✓ {message}\x1b[0m");
    }

    fn error(&self, message: &str) {
        println!("\x1b[31m✗ {message}\x1b[0m");
    }
}

/// Notifier that routes everything into tracing, for headless runs.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// Blocking y/N prompt on stdin.
pub struct StdinConfirm;

impl ConfirmPrompt for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        print!("{question} [y/N]: ");
        std::io::stdout().flush().ok();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
