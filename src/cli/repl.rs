//! Interactive operator REPL with line editing and slash-command completion.
//!
//! ## Commands
//!
//! - `/sessions` - reload and list stored sessions
//! - `/use <n|phone>` - pick the session operations run against
//! - `/login [phone]` - run the credential-verification flow
//! - `/profile`, `/avatar`, `/balance` - per-session lookups
//! - `/export contacts|chats|saved|photos|dialog <peer>` - artifact exports
//! - `/patterns` - pattern scan, then the three-level match browser
//! - `/email status|rotate|send <new>|verify <new> <code>` - login email ops
//! - `/2fa status|email <email>` - two-factor status and recovery email
//! - `/log open|close` - tailing log panel
//! - `/terminate`, `/delete`, `/history` - session management
//! - `/doctor`, `/help`, `/quit`

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rustyline::completion::Completer;
use rustyline::config::Config as LineConfig;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};

use crate::api::AccountApi;
use crate::auth::{AuthFlow, AuthStep, CodeEntry, PasswordEntry};
use crate::console::{
    Action, ArtifactPreview, Console, ExportKind, OpReport, SessionHandle,
};
use crate::notify::Notifier;
use crate::patterns::{BundleState, PatternBrowser};

/// Slash commands available in the REPL.
const SLASH_COMMANDS: &[&str] = &[
    "/help",
    "/quit",
    "/exit",
    "/sessions",
    "/use",
    "/login",
    "/profile",
    "/avatar",
    "/balance",
    "/export",
    "/patterns",
    "/email",
    "/2fa",
    "/log",
    "/terminate",
    "/delete",
    "/history",
    "/doctor",
];

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

fn history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".telecon")
        .join("history")
}

/// The interactive console session.
pub struct Repl {
    console: Arc<Console>,
    api: Arc<dyn AccountApi>,
    notifier: Arc<dyn Notifier>,
    browser: PatternBrowser,
    current: Option<SessionHandle>,
    editor: Editor<ReplHelper, DefaultHistory>,
}

impl Repl {
    pub fn new(
        console: Arc<Console>,
        api: Arc<dyn AccountApi>,
        notifier: Arc<dyn Notifier>,
        page_size: usize,
    ) -> anyhow::Result<Self> {
        let line_config = LineConfig::builder()
            .completion_type(CompletionType::List)
            .build();
        let mut editor: Editor<ReplHelper, DefaultHistory> = Editor::with_config(line_config)?;
        editor.set_helper(Some(ReplHelper));
        let _ = editor.load_history(&history_path());

        Ok(Self {
            browser: PatternBrowser::new(Arc::clone(&api), page_size),
            console,
            api,
            notifier,
            current: None,
            editor,
        })
    }

    fn readline(&mut self, prompt: &str) -> Result<String, ReadlineError> {
        tokio::task::block_in_place(|| self.editor.readline(prompt))
    }

    /// Main loop. Returns when the operator quits.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("telecon {} - type /help for commands", env!("CARGO_PKG_VERSION"));
        if let Err(e) = self.reload_sessions().await {
            self.notifier.error(&format!("session list unavailable: {e}"));
        }

        loop {
            let prompt = match &self.current {
                Some(session) => format!("{}> ", session.phone),
                None => "telecon> ".to_string(),
            };
            let line = match self.readline(&prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(&line);

            if matches!(line.as_str(), "/quit" | "/exit") {
                break;
            }
            if let Err(e) = self.handle(&line).await {
                self.notifier.error(&format!("{e}"));
            }
        }

        let _ = self.editor.save_history(&history_path());
        self.console.poller().shutdown();
        Ok(())
    }

    async fn handle(&mut self, line: &str) -> anyhow::Result<()> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match command {
            "/help" => print_help(),
            "/sessions" => {
                self.reload_sessions().await?;
                self.print_sessions();
            }
            "/use" => self.pick_session(args.first().copied()),
            "/login" => self.login(args.first().copied()).await?,
            "/profile" => self.dispatch(Action::ShowProfile).await?,
            "/avatar" => self.dispatch(Action::FetchAvatar).await?,
            "/balance" => {
                self.dispatch(Action::ScanBalance).await?;
                self.print_balance();
            }
            "/export" => self.export(&args).await?,
            "/patterns" => self.patterns().await?,
            "/email" => self.email(&args).await?,
            "/2fa" => self.two_factor(&args).await?,
            "/log" => self.log_panel(args.first().copied()).await?,
            "/terminate" => self.dispatch(Action::TerminateOtherSessions).await?,
            "/delete" => self.delete_session().await?,
            "/history" => self.history().await?,
            "/doctor" => super::doctor::run_doctor(Arc::clone(&self.api), false).await?,
            other => self
                .notifier
                .error(&format!("unknown command {other}, try /help")),
        }
        Ok(())
    }

    async fn reload_sessions(&mut self) -> anyhow::Result<()> {
        let sessions = self.console.load_sessions().await?;
        if let Some(current) = &self.current
            && !sessions.iter().any(|s| s.id == current.id)
        {
            self.current = None;
        }
        Ok(())
    }

    fn print_sessions(&self) {
        let sessions = self.console.sessions();
        if sessions.is_empty() {
            println!("no stored sessions; /login adds one");
            return;
        }
        for (idx, session) in sessions.iter().enumerate() {
            let name = self
                .console
                .profile(&session.phone_number)
                .and_then(|p| p.display_name())
                .unwrap_or_default();
            let dialogs = self
                .console
                .poller()
                .metrics(&session.phone_number)
                .and_then(|m| m.dialogs_count)
                .map_or(String::new(), |d| format!(", {d} dialogs"));
            println!(
                "  [{}] {} {} {}{}",
                idx + 1,
                session.phone_number,
                if session.is_active { "active" } else { "inactive" },
                name,
                dialogs,
            );
        }
    }

    fn pick_session(&mut self, selector: Option<&str>) {
        let Some(selector) = selector else {
            self.notifier.error("usage: /use <number|phone>");
            return;
        };
        let sessions = self.console.sessions();
        let found = selector
            .parse::<usize>()
            .ok()
            .and_then(|n| sessions.get(n.checked_sub(1)?))
            .or_else(|| sessions.iter().find(|s| s.phone_number == selector));
        match found {
            Some(record) => {
                self.current = Some(SessionHandle::from(record));
                println!("operating on {}", record.phone_number);
            }
            None => self.notifier.error(&format!("no session {selector}")),
        }
    }

    fn current_session(&self) -> Option<SessionHandle> {
        if self.current.is_none() {
            self.notifier.error("pick a session first: /use <n>");
        }
        self.current.clone()
    }

    /// Run one console action against the current session; on an accepted
    /// re-auth offer, drop straight into the login flow.
    async fn dispatch(&mut self, action: Action) -> anyhow::Result<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        match self.console.run(&session, action).await {
            OpReport::ReauthRequested => self.login(Some(session.phone.as_str())).await,
            _ => Ok(()),
        }
    }

    async fn export(&mut self, args: &[&str]) -> anyhow::Result<()> {
        let action = match args {
            ["contacts", ..] => Action::Export(ExportKind::Contacts),
            ["chats", ..] => Action::Export(ExportKind::Chats),
            ["saved", ..] => Action::Export(ExportKind::SavedMessages),
            ["photos", ..] => Action::Export(ExportKind::ContactPhotos),
            ["dialog", peer, ..] => Action::ExportDialog {
                peer: (*peer).to_string(),
            },
            _ => {
                self.notifier
                    .error("usage: /export contacts|chats|saved|photos|dialog <peer>");
                return Ok(());
            }
        };
        self.dispatch(action).await?;
        self.print_preview();
        Ok(())
    }

    fn print_preview(&self) {
        let Some((title, preview)) = self.console.last_preview() else {
            return;
        };
        println!("── {title} ──");
        match preview {
            ArtifactPreview::Rows(rows) => {
                for row in rows.iter().take(20) {
                    println!("  {}", row.join(" | "));
                }
                if rows.len() > 20 {
                    println!("  … {} more rows", rows.len() - 20);
                }
            }
            ArtifactPreview::Data(value) => {
                let rendered = serde_json::to_string_pretty(&value).unwrap_or_default();
                for line in rendered.lines().take(30) {
                    println!("  {line}");
                }
            }
            ArtifactPreview::Transcript(messages) => {
                for message in messages.iter().take(20) {
                    println!(
                        "  [{}] {}: {}",
                        message.timestamp, message.sender, message.body
                    );
                }
            }
            ArtifactPreview::Raw(text) => {
                for line in text.lines().take(20) {
                    println!("  {line}");
                }
            }
        }
    }

    fn print_balance(&self) {
        let Some(session) = &self.current else {
            return;
        };
        let Some(report) = self.console.balance(&session.phone) else {
            return;
        };
        for (bot, balances) in &report.accounts {
            println!("  {bot}:");
            for entry in &balances.balances {
                println!("    {} {}", entry.coin, entry.amount);
            }
        }
    }

    async fn email(&mut self, args: &[&str]) -> anyhow::Result<()> {
        let action = match args {
            ["status", ..] => Action::LoginEmailStatus,
            ["rotate", ..] => Action::RotateLoginEmail,
            ["send", new_email, ..] => Action::ChangeLoginEmailSend {
                new_email: (*new_email).to_string(),
            },
            ["verify", new_email, code, ..] => Action::ChangeLoginEmailVerify {
                new_email: (*new_email).to_string(),
                code: (*code).to_string(),
            },
            _ => {
                self.notifier
                    .error("usage: /email status|rotate|send <new>|verify <new> <code>");
                return Ok(());
            }
        };
        self.dispatch(action).await
    }

    async fn two_factor(&mut self, args: &[&str]) -> anyhow::Result<()> {
        match args {
            ["status", ..] | [] => self.dispatch(Action::CheckTwoFactor).await,
            ["email", email, ..] => {
                let new_password = self
                    .readline("new 2FA password (empty to keep): ")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                let current_password = if new_password.is_none() {
                    self.readline("current 2FA password: ")
                        .ok()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                } else {
                    None
                };
                self.dispatch(Action::SetTwoFactorEmail {
                    email: (*email).to_string(),
                    new_password,
                    current_password,
                })
                .await
            }
            _ => {
                self.notifier.error("usage: /2fa status|email <email>");
                Ok(())
            }
        }
    }

    async fn log_panel(&mut self, arg: Option<&str>) -> anyhow::Result<()> {
        match arg {
            Some("open") | None => {
                self.dispatch(Action::OpenLog).await?;
                if let Some(session) = &self.current {
                    // Give the immediate fetch a moment to land.
                    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                    match self.console.poller().log_view(&session.phone) {
                        Some(view) => {
                            if let Some(mtime) = view.mtime {
                                println!("── log (updated {mtime}) ──");
                            }
                            for line in view.text.lines().rev().take(40).collect::<Vec<_>>().iter().rev()
                            {
                                println!("  {line}");
                            }
                        }
                        None => println!("log not available yet, re-run /log open"),
                    }
                }
                Ok(())
            }
            Some("close") => self.dispatch(Action::CloseLog).await,
            _ => {
                self.notifier.error("usage: /log open|close");
                Ok(())
            }
        }
    }

    async fn delete_session(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        match self.console.run(&session, Action::DeleteSession).await {
            OpReport::Completed => {
                self.current = None;
                self.print_sessions();
                Ok(())
            }
            OpReport::ReauthRequested => self.login(Some(session.phone.as_str())).await,
            _ => Ok(()),
        }
    }

    async fn history(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        let entries = self.api.session_history(session.id).await?;
        if entries.is_empty() {
            println!("no history for {}", session.phone);
        }
        for entry in entries {
            let when = entry
                .created_at
                .map_or(String::new(), |t| format!("{t} "));
            let details = entry.details.map_or(String::new(), |d| format!(" - {d}"));
            println!("  {when}{}{details}", entry.action);
        }
        Ok(())
    }

    // --- pattern browsing -------------------------------------------------

    async fn patterns(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        match self.console.run(&session, Action::ScanPatterns).await {
            OpReport::ReauthRequested => return self.login(Some(session.phone.as_str())).await,
            OpReport::Completed => {}
            _ => return Ok(()),
        }

        match self.browser.load_index(&session.phone).await {
            Ok(count) => println!("{count} chats with matches; browse with list/filter/open/back"),
            Err(rejection) => {
                self.notifier.error(&rejection.message);
                return Ok(());
            }
        }
        self.browse_loop().await
    }

    async fn browse_loop(&mut self) -> anyhow::Result<()> {
        self.print_chats();
        loop {
            let line = match self.readline("patterns> ") {
                Ok(line) => line,
                Err(_) => return Ok(()),
            };
            let mut parts = line.split_whitespace();
            let command = parts.next().unwrap_or_default();
            let rest: Vec<&str> = parts.collect();

            match (command, self.browser.selected_chat().is_some()) {
                ("quit", _) | ("q", _) => return Ok(()),
                ("list", _) => self.print_level(),
                ("more", false) => {
                    self.browser.show_more_chats();
                    self.print_chats();
                }
                ("more", true) => {
                    self.browser.show_more_matches();
                    self.print_matches();
                }
                ("filter", false) => {
                    self.browser.set_chat_filter(&rest.join(" "));
                    self.print_chats();
                }
                ("keyword", true) => {
                    self.browser.set_keyword_filter(&rest.join(" "));
                    self.print_matches();
                }
                ("dates", true) => {
                    let from = rest.first().and_then(|s| s.parse().ok());
                    let to = rest.get(1).and_then(|s| s.parse().ok());
                    self.browser.set_date_range(from, to);
                    self.print_matches();
                }
                ("open", false) => {
                    let picked = rest
                        .first()
                        .and_then(|s| s.parse::<usize>().ok())
                        .and_then(|n| {
                            self.browser
                                .visible_chats()
                                .get(n.checked_sub(1)?)
                                .map(|c| c.chat_id)
                        });
                    match picked {
                        Some(chat_id) => {
                            if self.browser.select_chat(chat_id) {
                                self.print_matches();
                            }
                        }
                        None => println!("open <n> from the chat list"),
                    }
                }
                ("open", true) => {
                    let picked = rest
                        .first()
                        .and_then(|s| s.parse::<usize>().ok())
                        .and_then(|n| {
                            self.browser
                                .visible_matches()
                                .get(n.checked_sub(1)?)
                                .map(|b| b.match_id.clone())
                        });
                    match picked {
                        Some(match_id) => {
                            self.browser.select_match(&match_id).await;
                            self.print_bundle();
                        }
                        None => println!("open <n> from the match list"),
                    }
                }
                ("retry", true) => {
                    self.browser.retry_bundle().await;
                    self.print_bundle();
                }
                ("back", _) => {
                    if !self.browser.back() {
                        return Ok(());
                    }
                    self.print_level();
                }
                _ => println!(
                    "commands: list, more, open <n>, back, quit, filter <text> (chats), keyword <text> / dates <from> <to> (matches), retry"
                ),
            }
        }
    }

    fn print_level(&self) {
        if self.browser.selected_match_id().is_some() {
            self.print_bundle();
        } else if self.browser.selected_chat().is_some() {
            self.print_matches();
        } else {
            self.print_chats();
        }
    }

    fn print_chats(&self) {
        let visible = self.browser.visible_chats();
        let total = self.browser.filtered_chat_count();
        for (idx, chat) in visible.iter().enumerate() {
            println!(
                "  [{}] {} ({} matches)",
                idx + 1,
                chat.chat_name,
                chat.bundles.len()
            );
        }
        if total > visible.len() {
            println!("  … {} more, 'more' to reveal", total - visible.len());
        }
    }

    fn print_matches(&self) {
        let Some(chat) = self.browser.selected_chat() else {
            return;
        };
        println!("{}:", chat.chat_name);
        let visible = self.browser.visible_matches();
        let total = self.browser.filtered_match_count();
        for (idx, summary) in visible.iter().enumerate() {
            let date = summary
                .date
                .map_or(String::new(), |d| format!("{} ", d.format("%Y-%m-%d")));
            println!("  [{}] {}{}", idx + 1, date, summary.text_excerpt);
        }
        if total > visible.len() {
            println!("  … {} more, 'more' to reveal", total - visible.len());
        }
    }

    fn print_bundle(&self) {
        match self.browser.bundle() {
            BundleState::Idle => {}
            BundleState::Loading => println!("loading …"),
            BundleState::Failed(message) => {
                println!("bundle failed: {message} ('retry' to try again)")
            }
            BundleState::Loaded(bundle) => {
                let render = |m: &crate::api::types::BundleMessage| {
                    let date = m
                        .date
                        .map_or(String::new(), |d| format!("[{}] ", d.format("%Y-%m-%d %H:%M")));
                    let sender = m.sender.clone().unwrap_or_default();
                    let text = m.text.clone().unwrap_or_default();
                    println!("  {date}{sender}: {text}");
                };
                for message in &bundle.before {
                    render(message);
                }
                if let Some(matched) = &bundle.matched {
                    print!("» ");
                    render(matched);
                }
                for message in &bundle.after {
                    render(message);
                }
            }
        }
    }

    // --- credential flow --------------------------------------------------

    /// Drive the auth state machine interactively until it terminates.
    pub async fn login(&mut self, phone: Option<&str>) -> anyhow::Result<()> {
        let phone = match phone {
            Some(phone) => phone.to_string(),
            None => {
                let entered = self.readline("phone (+international): ")?;
                entered.trim().to_string()
            }
        };

        let mut flow = AuthFlow::new(Arc::clone(&self.api), Arc::clone(&self.notifier));
        flow.send_code(&phone, false).await;
        if flow.step() == AuthStep::Phone {
            return Ok(());
        }

        let mut last_tick = Instant::now();
        loop {
            // Advisory countdown; credit wall-clock seconds spent at prompts.
            for _ in 0..last_tick.elapsed().as_secs() {
                flow.tick_cooldown();
            }
            last_tick = Instant::now();

            match flow.step() {
                AuthStep::Phone => return Ok(()),
                AuthStep::Code(CodeEntry::EmailVerification) => {
                    if flow.email_pattern().is_none() {
                        let email = self.readline("account email: ")?;
                        let email = email.trim();
                        if email.is_empty() {
                            flow.cancel();
                            return Ok(());
                        }
                        flow.send_email_code(email).await;
                    } else {
                        let code = self.readline("code from email: ")?;
                        flow.verify_email_code(code.trim()).await;
                    }
                }
                AuthStep::Code(CodeEntry::Normal) => {
                    let remaining = flow.cooldown_remaining();
                    let hint = if remaining > 0 {
                        format!(" (resend in {remaining}s)")
                    } else {
                        " (or resend/sms/back)".to_string()
                    };
                    let input = self.readline(&format!(
                        "code sent to {}{hint}: ",
                        flow.sent_to().unwrap_or("?")
                    ))?;
                    match input.trim() {
                        "" => {}
                        "resend" => {
                            flow.resend(false).await;
                        }
                        "sms" => {
                            flow.resend(true).await;
                        }
                        "back" => {
                            flow.cancel();
                            return Ok(());
                        }
                        code => {
                            flow.verify_code(code).await;
                        }
                    }
                }
                AuthStep::Password(PasswordEntry::Enter) => {
                    let input = self.readline("2FA password (or forgot/back): ")?;
                    match input.trim() {
                        "" => {}
                        "forgot" => {
                            flow.forgot_password();
                        }
                        "back" => {
                            flow.go_back();
                        }
                        password => {
                            flow.verify_password(password).await;
                        }
                    }
                }
                AuthStep::Password(PasswordEntry::Reset) => {
                    if flow.masked_email().is_none() {
                        flow.request_reset_code().await;
                        if flow.masked_email().is_none() {
                            flow.go_back();
                            continue;
                        }
                    }
                    let code = self
                        .readline(&format!(
                            "reset code sent to {}: ",
                            flow.masked_email().unwrap_or("?")
                        ))?
                        .trim()
                        .to_string();
                    if code.is_empty() {
                        flow.go_back();
                        continue;
                    }
                    let new_password = self.readline("new 2FA password: ")?;
                    flow.change_password(&code, new_password.trim()).await;
                }
                AuthStep::Success => {
                    if let Some(task) = flow.take_side_task() {
                        let _ = task.await;
                    }
                    self.reload_sessions().await?;
                    self.print_sessions();
                    return Ok(());
                }
            }
        }
    }
}

fn print_help() {
    println!(
        "\
/sessions                 reload and list stored sessions
/use <n|phone>            pick the session to operate on
/login [phone]            run the credential-verification flow
/profile                  account profile for the current session
/avatar                   refresh the stored avatar
/balance                  collect bot balances
/export contacts|chats|saved|photos|dialog <peer>
/patterns                 pattern scan + match browser
/email status|rotate|send <new>|verify <new> <code>
/2fa status|email <email>
/log open|close           tail the session log
/terminate                terminate the account's other sessions
/delete                   delete the stored session
/history                  session audit history
/doctor                   connectivity diagnostics
/quit"
    );
}
