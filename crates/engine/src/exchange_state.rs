//! Per-account queue of exchanges awaiting settlement.

use std::collections::HashMap;

use serde::Serialize;

use synth_common::{AccountId, AssetId, Decimal, SynthError, SynthResult, Timestamp};

/// One exchange into `dest`, recorded at the rates it executed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeEntry {
    pub src: AssetId,
    pub amount: Decimal,
    pub dest: AssetId,
    pub amount_received: Decimal,
    pub exchange_fee_rate: Decimal,
    pub timestamp: Timestamp,
    pub round_id_for_src: u64,
    pub round_id_for_dest: u64,
}

/// Entries keyed by (account, destination asset), oldest first.
#[derive(Debug, Clone)]
pub struct ExchangeState {
    entries: HashMap<(AccountId, AssetId), Vec<ExchangeEntry>>,
    max_entries_in_queue: usize,
}

impl ExchangeState {
    pub fn new(max_entries_in_queue: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries_in_queue,
        }
    }

    pub fn max_entries_in_queue(&self) -> usize {
        self.max_entries_in_queue
    }

    pub fn set_max_entries_in_queue(&mut self, max: usize) {
        self.max_entries_in_queue = max;
    }

    pub fn entries(&self, account: &AccountId, asset: &AssetId) -> &[ExchangeEntry] {
        self.entries
            .get(&(account.clone(), asset.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_length_of_entries(&self, account: &AccountId, asset: &AssetId) -> usize {
        self.entries(account, asset).len()
    }

    pub fn get_entry_at(&self, account: &AccountId, asset: &AssetId, index: usize) -> Option<&ExchangeEntry> {
        self.entries(account, asset).get(index)
    }

    /// Latest timestamp among queued entries, 0 when empty.
    pub fn get_max_timestamp(&self, account: &AccountId, asset: &AssetId) -> Timestamp {
        self.entries(account, asset)
            .iter()
            .map(|e| e.timestamp)
            .max()
            .unwrap_or(0)
    }

    /// Fail with `QueueFull` if `incoming` more entries would not fit once
    /// `leaving` entries have been removed.
    pub fn ensure_capacity(
        &self,
        account: &AccountId,
        asset: &AssetId,
        leaving: usize,
        incoming: usize,
    ) -> SynthResult<()> {
        let queued = self.get_length_of_entries(account, asset).saturating_sub(leaving);
        if queued + incoming > self.max_entries_in_queue {
            return Err(SynthError::QueueFull {
                asset: asset.clone(),
                max: self.max_entries_in_queue,
            });
        }
        Ok(())
    }

    pub fn append_exchange_entry(&mut self, account: &AccountId, entry: ExchangeEntry) -> SynthResult<()> {
        self.ensure_capacity(account, &entry.dest, 0, 1)?;
        self.entries
            .entry((account.clone(), entry.dest.clone()))
            .or_default()
            .push(entry);
        Ok(())
    }

    /// Remove and return entries timestamped at or before `cutoff`.
    pub fn remove_entries_through(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        cutoff: Timestamp,
    ) -> Vec<ExchangeEntry> {
        let key = (account.clone(), asset.clone());
        let Some(queue) = self.entries.get_mut(&key) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) =
            queue.drain(..).partition(|e| e.timestamp <= cutoff);
        if kept.is_empty() {
            self.entries.remove(&key);
        } else {
            *queue = kept;
        }
        removed
    }

    /// Total queued entries across all accounts.
    pub fn total_entries(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}
