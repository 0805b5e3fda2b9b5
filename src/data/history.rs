use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evm::token::TokenAmount;
use crate::utils::time::{end_of_day, now_s};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Investment,
    Withdrawal,
    Reinvestment,
    Claim,
    Approval,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct TransactionHistoryEntry {
    pub id: Uuid,
    pub kind: TxKind,
    pub amount: Option<TokenAmount>,
    pub timestamp: u64, // seconds
    /// investment period in days, for deposits and reinvestments
    pub plan: Option<u64>,
    pub tx_hash: B256,
    pub status: TxStatus,
}

impl TransactionHistoryEntry {
    pub fn completed(kind: TxKind, tx_hash: B256, amount: Option<TokenAmount>, plan: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            timestamp: now_s(),
            plan,
            tx_hash,
            status: TxStatus::Completed,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub kind: Option<TxKind>,
    pub start: Option<u64>,
    /// inclusive up to the end of this UTC day
    pub end: Option<u64>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &TransactionHistoryEntry) -> bool {
        if self.kind.is_some_and(|k| k != entry.kind) {
            return false;
        }
        if self.start.is_some_and(|s| entry.timestamp < s) {
            return false;
        }
        if self.end.is_some_and(|e| entry.timestamp > end_of_day(e)) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
}

/// 1-based pages. Out of range falls back to page 1.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_pages = items.len().div_ceil(per_page).max(1);
    let page = if page == 0 || page > total_pages { 1 } else { page };
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(items.len());
    Page {
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        page,
        total_pages,
    }
}

/// Session-lifetime log of submitted writes, oldest first.
#[derive(Debug, Default)]
pub struct TxHistory {
    entries: Vec<TransactionHistoryEntry>,
}

impl TxHistory {
    pub fn push(&mut self, entry: TransactionHistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TransactionHistoryEntry] {
        &self.entries
    }

    /// Newest first.
    pub fn filter(&self, filter: &HistoryFilter) -> Vec<TransactionHistoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
