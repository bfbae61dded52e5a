//! Scan position of the settlement bot.
//!
//! The cursor is the first report id of the next `getData` window and only
//! moves forward. Reports it passes that still need settling are remembered in
//! a pending set and re-read on every cycle until they are settled or
//! distributed, so one long-lived report never holds the window in place.

use keeper_storage::{StorageError, StorageService};
use keeper_types::{Candidate, ReportRecord, StorageKey};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Where the next settlement cycle reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPosition {
	/// First report id of the next window.
	pub cursor: u64,
	/// Unsettled reports the cursor has already passed.
	pub pending: BTreeSet<u64>,
}

impl ScanPosition {
	pub fn at(cursor: u64) -> Self {
		Self {
			cursor,
			pending: BTreeSet::new(),
		}
	}

	/// Half-open `getData` ranges covering the pending reports behind the cursor.
	///
	/// Ids closer together than `max_len` share one range, so a cluster of
	/// pending reports costs one call instead of one per report.
	pub fn recheck_ranges(&self, max_len: u64) -> Vec<(u64, u64)> {
		let max_len = max_len.max(1);
		let mut ranges: Vec<(u64, u64)> = Vec::new();
		for &id in self.pending.range(..self.cursor) {
			match ranges.last_mut() {
				Some((start, end)) if id < start.saturating_add(max_len) => *end = id + 1,
				_ => ranges.push((id, id + 1)),
			}
		}
		ranges
	}
}

/// Persists one scan position per bot: the cursor under `cursor:<bot>` and the
/// pending set under `pending:<bot>`.
pub struct CursorStore {
	storage: Arc<StorageService>,
	key: String,
	start: u64,
}

impl CursorStore {
	pub fn new(storage: Arc<StorageService>, bot: &str, start: u64) -> Self {
		Self {
			storage,
			key: bot.to_string(),
			start,
		}
	}

	/// Stored position, with the cursor floored at the configured start id.
	pub async fn load(&self) -> Result<ScanPosition, StorageError> {
		let cursor = self
			.storage
			.retrieve_optional::<u64>(StorageKey::Cursor, &self.key)
			.await?
			.unwrap_or(self.start)
			.max(self.start);
		let pending = self
			.storage
			.retrieve_optional::<BTreeSet<u64>>(StorageKey::PendingSettlements, &self.key)
			.await?
			.unwrap_or_default();
		Ok(ScanPosition { cursor, pending })
	}

	/// Writes the pending set before the cursor, so a failed cursor write never
	/// loses track of a report the old cursor would no longer re-read.
	pub async fn save(&self, position: &ScanPosition) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::PendingSettlements, &self.key, &position.pending)
			.await?;
		self.storage
			.store(StorageKey::Cursor, &self.key, &position.cursor)
			.await
	}
}

/// Scan position after a cycle.
///
/// `candidates` holds everything the cycle selected, both the re-read pending
/// reports and the new window. A candidate stays pending while it is unsettled
/// and was not settled by this cycle's batch.
///
/// The cursor moves just past the highest report in `window` that has an
/// initial report. Reports still waiting for one are not candidates: trailing
/// ones are read again next cycle, while ones followed by a later initialized
/// report are passed over for good, like reports that need no action. The
/// cursor never moves backwards.
pub fn advance(
	current: &ScanPosition,
	window: &[ReportRecord],
	candidates: &[Candidate],
	settled: &HashSet<u64>,
) -> ScanPosition {
	let pending = candidates
		.iter()
		.filter(|c| !c.report.is_settled && !settled.contains(&c.report_id()))
		.map(Candidate::report_id)
		.collect();

	let cursor = window
		.iter()
		.filter(|r| r.is_initialized())
		.map(|r| r.report_id)
		.max()
		.map_or(current.cursor, |id| id.saturating_add(1))
		.max(current.cursor);

	ScanPosition { cursor, pending }
}
