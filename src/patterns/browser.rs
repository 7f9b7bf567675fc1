//! Three-level navigator over a computed pattern-search index.
//!
//! Level 1: chat index, filtered by name substring, sorted by descending
//! match count. Level 2: the selected chat's matches, filtered by excerpt
//! keyword and an inclusive date range, in index order. Level 3: one match's
//! lazily fetched message window.
//!
//! Every level pages independently; "show more" appends a page instead of
//! replacing state. Going back clears only the state owned by the level(s)
//! being exited, so drilling back in keeps the parent level's filters.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::AccountApi;
use crate::api::types::{BundleSummary, ChatSummary, MatchBundle, Outcome, classify_hint};
use crate::error::{ErrorHint, Rejection};

/// Display state of the bundle detail level. Mutually exclusive by
/// construction.
#[derive(Debug, Clone)]
pub enum BundleState {
    Idle,
    Loading,
    Loaded(MatchBundle),
    /// Retryable in place; the selected match id is kept.
    Failed(String),
}

impl BundleState {
    pub fn is_loading(&self) -> bool {
        matches!(self, BundleState::Loading)
    }
}

/// The navigator. One instance per console, re-armed by `load_index`.
pub struct PatternBrowser {
    api: Arc<dyn AccountApi>,
    page_size: usize,
    phone: Option<String>,
    index: Vec<ChatSummary>,
    chat_filter: String,
    chats_page: usize,
    selected_chat: Option<i64>,
    keyword_filter: String,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    bundles_page: usize,
    selected_match: Option<String>,
    bundle: BundleState,
}

impl PatternBrowser {
    pub fn new(api: Arc<dyn AccountApi>, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            phone: None,
            index: Vec::new(),
            chat_filter: String::new(),
            chats_page: 0,
            selected_chat: None,
            keyword_filter: String::new(),
            date_from: None,
            date_to: None,
            bundles_page: 0,
            selected_match: None,
            bundle: BundleState::Idle,
        }
    }

    /// Load (or reload) the index for a session. Resets every level: the
    /// previous selection belongs to a stale index and must not survive.
    pub async fn load_index(&mut self, phone: &str) -> Result<usize, Rejection> {
        let outcome = match self.api.pattern_index(phone).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = e.to_string();
                let hint = classify_hint(&detail).unwrap_or(ErrorHint::Transport);
                self.reset(None);
                return Err(Rejection::new(detail, Some(hint)));
            }
        };

        match outcome {
            Outcome::Success(payload) => {
                self.reset(Some(phone.to_string()));
                self.index = payload.index;
                Ok(self.index.len())
            }
            Outcome::Rejected(rejection) => {
                self.reset(None);
                Err(rejection)
            }
        }
    }

    fn reset(&mut self, phone: Option<String>) {
        self.phone = phone;
        self.index.clear();
        self.chat_filter.clear();
        self.chats_page = 0;
        self.selected_chat = None;
        self.keyword_filter.clear();
        self.date_from = None;
        self.date_to = None;
        self.bundles_page = 0;
        self.selected_match = None;
        self.bundle = BundleState::Idle;
    }

    pub fn has_index(&self) -> bool {
        !self.index.is_empty()
    }

    // --- level 1: chat index --------------------------------------------

    pub fn set_chat_filter(&mut self, filter: &str) {
        self.chat_filter = filter.to_string();
    }

    fn filtered_chats(&self) -> Vec<&ChatSummary> {
        let needle = self.chat_filter.to_lowercase();
        let mut chats: Vec<&ChatSummary> = self
            .index
            .iter()
            .filter(|c| c.chat_name.to_lowercase().contains(&needle))
            .collect();
        chats.sort_by(|a, b| b.bundles.len().cmp(&a.bundles.len()));
        chats
    }

    pub fn filtered_chat_count(&self) -> usize {
        self.filtered_chats().len()
    }

    /// Chats currently on screen: filtered, sorted, first `pages × size`.
    pub fn visible_chats(&self) -> Vec<&ChatSummary> {
        let visible = (self.chats_page + 1) * self.page_size;
        let mut chats = self.filtered_chats();
        chats.truncate(visible);
        chats
    }

    /// Append one more page. Returns the new visible count.
    pub fn show_more_chats(&mut self) -> usize {
        if self.filtered_chat_count() > (self.chats_page + 1) * self.page_size {
            self.chats_page += 1;
        }
        self.visible_chats().len()
    }

    /// Enter level 2 for a chat. The chat must belong to the current index.
    pub fn select_chat(&mut self, chat_id: i64) -> bool {
        if !self.index.iter().any(|c| c.chat_id == chat_id) {
            return false;
        }
        self.selected_chat = Some(chat_id);
        self.bundles_page = 0;
        true
    }

    pub fn selected_chat(&self) -> Option<&ChatSummary> {
        let id = self.selected_chat?;
        self.index.iter().find(|c| c.chat_id == id)
    }

    // --- level 2: match list --------------------------------------------

    pub fn set_keyword_filter(&mut self, keyword: &str) {
        self.keyword_filter = keyword.to_string();
    }

    /// Inclusive date range on both ends.
    pub fn set_date_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        self.date_from = from;
        self.date_to = to;
    }

    fn match_passes(&self, bundle: &BundleSummary) -> bool {
        if let Some(from) = self.date_from {
            match bundle.date {
                Some(date) if date.date_naive() >= from => {}
                _ => return false,
            }
        }
        if let Some(to) = self.date_to {
            match bundle.date {
                Some(date) if date.date_naive() <= to => {}
                _ => return false,
            }
        }
        if !self.keyword_filter.is_empty() {
            let needle = self.keyword_filter.to_lowercase();
            if !bundle.text_excerpt.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }

    fn filtered_matches(&self) -> Vec<&BundleSummary> {
        let Some(chat) = self.selected_chat() else {
            return Vec::new();
        };
        chat.bundles.iter().filter(|b| self.match_passes(b)).collect()
    }

    pub fn filtered_match_count(&self) -> usize {
        self.filtered_matches().len()
    }

    /// Matches on screen, in index insertion order.
    pub fn visible_matches(&self) -> Vec<&BundleSummary> {
        let visible = (self.bundles_page + 1) * self.page_size;
        let mut matches = self.filtered_matches();
        matches.truncate(visible);
        matches
    }

    pub fn show_more_matches(&mut self) -> usize {
        if self.filtered_match_count() > (self.bundles_page + 1) * self.page_size {
            self.bundles_page += 1;
        }
        self.visible_matches().len()
    }

    // --- level 3: bundle detail -----------------------------------------

    /// Enter level 3: select a match and fetch its message window. The match
    /// must belong to the selected chat of the current index.
    pub async fn select_match(&mut self, match_id: &str) -> bool {
        let Some(chat) = self.selected_chat() else {
            return false;
        };
        if !chat.bundles.iter().any(|b| b.match_id == match_id) {
            return false;
        }
        self.selected_match = Some(match_id.to_string());
        self.fetch_bundle().await;
        true
    }

    /// Refetch the bundle for the already-selected match after a failure.
    pub async fn retry_bundle(&mut self) -> bool {
        if self.selected_match.is_none() {
            return false;
        }
        self.fetch_bundle().await;
        true
    }

    async fn fetch_bundle(&mut self) {
        let (Some(phone), Some(chat_id), Some(match_id)) = (
            self.phone.clone(),
            self.selected_chat,
            self.selected_match.clone(),
        ) else {
            return;
        };

        self.bundle = BundleState::Loading;
        self.bundle = match self.api.pattern_bundle(&phone, chat_id, &match_id).await {
            Ok(Outcome::Success(envelope)) => {
                BundleState::Loaded(envelope.bundle.unwrap_or_default())
            }
            Ok(Outcome::Rejected(rejection)) => BundleState::Failed(rejection.message),
            Err(e) => BundleState::Failed(e.to_string()),
        };
    }

    pub fn selected_match_id(&self) -> Option<&str> {
        self.selected_match.as_deref()
    }

    pub fn bundle(&self) -> &BundleState {
        &self.bundle
    }

    // --- navigation ------------------------------------------------------

    /// Leave the current level, clearing only what that level owns.
    pub fn back(&mut self) -> bool {
        if self.selected_match.is_some() {
            self.selected_match = None;
            self.bundle = BundleState::Idle;
            return true;
        }
        if self.selected_chat.is_some() {
            self.selected_chat = None;
            self.keyword_filter.clear();
            self.date_from = None;
            self.date_to = None;
            self.bundles_page = 0;
            return true;
        }
        false
    }
}
