//! Append-only record of how the global debt pool has been diluted.
//!
//! Entry `i` is the cumulative ratio by which every debt share recorded at or
//! before `i` has been scaled. An account that owned fraction `o` of the pool
//! at entry `k` owns `o * ledger[latest] / ledger[k]` of it now.
//!
//! When the pool is empty before or after a change, the next entry restarts at
//! 1 and opens a new epoch. Shares recorded in an earlier epoch are worth
//! nothing: the pool they were a fraction of no longer exists.
//!
//! "Empty" means at or below [`EMPTY_POOL_DUST`]. Every debt read truncates,
//! so repaying the whole pool leaves a few raw units of supply behind; scaling
//! the ledger by `T_before / dust` would overflow.

use serde::Serialize;

use synth_common::decimal::mul_div;
use synth_common::error::OrOverflow;
use synth_common::{Decimal, PreciseDecimal, SynthResult};

/// Total debt at or below which the pool counts as empty (1e-9 of the base asset).
pub const EMPTY_POOL_DUST: Decimal = Decimal::from_raw(1_000_000_000);

fn is_empty_pool(total: Decimal) -> bool {
    total <= EMPTY_POOL_DUST
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebtLedger {
    entries: Vec<PreciseDecimal>,
    /// Indices at which an epoch starts, ascending.
    epoch_starts: Vec<usize>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<PreciseDecimal> {
        self.entries.get(index).copied()
    }

    pub fn latest_index(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    pub fn epoch_starts(&self) -> &[usize] {
        &self.epoch_starts
    }

    /// The entry that would be appended for a change of the total debt from
    /// `total_before` to `total_after`, and whether it opens a new epoch.
    pub fn next_entry(
        &self,
        total_before: Decimal,
        total_after: Decimal,
    ) -> SynthResult<(PreciseDecimal, bool)> {
        match self.entries.last() {
            Some(last) if !is_empty_pool(total_before) && !is_empty_pool(total_after) => {
                let next = mul_div(last.raw(), total_before.raw(), total_after.raw()).or_overflow()?;
                Ok((PreciseDecimal::from_raw(next), false))
            }
            _ => Ok((PreciseDecimal::ONE, true)),
        }
    }

    /// Append the entry for a total-debt change and return its index.
    pub fn append(&mut self, total_before: Decimal, total_after: Decimal) -> SynthResult<usize> {
        let (entry, new_epoch) = self.next_entry(total_before, total_after)?;
        Ok(self.push(entry, new_epoch))
    }

    /// Append an entry computed earlier by [`next_entry`](Self::next_entry).
    pub fn push(&mut self, entry: PreciseDecimal, new_epoch: bool) -> usize {
        let index = self.entries.len();
        self.entries.push(entry);
        if new_epoch {
            self.epoch_starts.push(index);
            tracing::debug!(index, "Debt ledger epoch started");
        }
        index
    }

    fn epoch_of(&self, index: usize) -> usize {
        // Number of epochs started at or before `index`
        self.epoch_starts.partition_point(|&start| start <= index)
    }

    /// Whether `a` and `b` fall in the same epoch.
    pub fn same_epoch(&self, a: usize, b: usize) -> bool {
        self.epoch_of(a) == self.epoch_of(b)
    }

    /// Scale a share recorded at `from` forward to `to`.
    ///
    /// Zero when `from` is not a valid index at or before `to`, or when an
    /// epoch restart lies between them.
    pub fn share_at(
        &self,
        ownership: PreciseDecimal,
        from: usize,
        to: usize,
    ) -> SynthResult<PreciseDecimal> {
        if ownership.is_zero() || from > to || !self.same_epoch(from, to) {
            return Ok(PreciseDecimal::ZERO);
        }
        match (self.entry(from), self.entry(to)) {
            (Some(start), Some(end)) => ownership.checked_mul_div(end, start).or_overflow(),
            _ => Ok(PreciseDecimal::ZERO),
        }
    }

    /// Share of the pool, recorded at `from`, as of the latest entry.
    pub fn current_share(&self, ownership: PreciseDecimal, from: usize) -> SynthResult<PreciseDecimal> {
        match self.latest_index() {
            Some(latest) => self.share_at(ownership, from, latest),
            None => Ok(PreciseDecimal::ZERO),
        }
    }

    /// `share * total`, where `share` is a 27-decimal fraction.
    pub fn apply_share(share: PreciseDecimal, total: Decimal) -> SynthResult<Decimal> {
        mul_div(total.raw(), share.raw(), PreciseDecimal::UNIT)
            .map(Decimal::from_raw)
            .or_overflow()
    }

    /// `part / total` as a 27-decimal fraction. Zero when `total` is zero.
    pub fn ownership_of(part: Decimal, total: Decimal) -> SynthResult<PreciseDecimal> {
        if total.is_zero() {
            return Ok(PreciseDecimal::ZERO);
        }
        mul_div(part.raw(), PreciseDecimal::UNIT, total.raw())
            .map(PreciseDecimal::from_raw)
            .or_overflow()
    }
}
