//! The atomic current-version handle and the snapshot-install protocol.
//!
//! A logical group is a chain of immutable snapshots sharing one [`SelfRef`]
//! slot. Mutation never touches a snapshot in place: it derives a successor
//! from whichever snapshot is currently installed and compare-and-swaps the
//! slot over to it. Losing a swap round means another mutation won it, so the
//! loop retries against the fresh snapshot until it wins or finds the slot
//! emptied by removal.

use std::ptr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::entries::Entries;
use crate::error::{Result, StoreError};
use crate::qualifier::QualifierMap;

/// Single-slot handle holding whichever snapshot is currently authoritative
/// for one logical group. Empty once the group has been removed.
///
/// Every snapshot of the same logical group shares the same slot by
/// construction; the slot is only retargeted through [`install`] (or emptied
/// through [`SelfRef::take`] on removal), never by plain store.
#[derive(Debug)]
pub struct SelfRef<S> {
	slot: ArcSwapOption<S>,
}

impl<S> SelfRef<S> {
	pub(crate) fn empty() -> Self {
		Self { slot: ArcSwapOption::empty() }
	}

	/// Installs the first snapshot of a freshly registered group.
	pub(crate) fn seed(&self, snapshot: Arc<S>) {
		self.slot.store(Some(snapshot));
	}

	/// The currently authoritative snapshot, if the group is still live.
	pub fn current(&self) -> Option<Arc<S>> {
		self.slot.load_full()
	}

	/// True when `snapshot` is the currently installed one.
	pub fn is_current(&self, snapshot: &S) -> bool {
		self.slot.load().as_ref().is_some_and(|cur| ptr::eq(Arc::as_ptr(cur), snapshot))
	}

	/// Empties the slot, returning the snapshot that was current.
	pub(crate) fn take(&self) -> Option<Arc<S>> {
		self.slot.swap(None)
	}
}

/// Capability every concrete snapshot variant implements so the shared
/// install loop can construct successors without naming a concrete type.
pub trait GroupSnapshot: Send + Sync + Sized + 'static {
	/// Stable identifier of the logical group.
	fn name(&self) -> &str;

	fn qualifiers(&self) -> &QualifierMap;

	fn entries(&self) -> &Entries;

	/// The current-version slot shared by all snapshots of this group.
	fn self_ref(&self) -> &SelfRef<Self>;

	/// Builds the successor snapshot with the given replacement payload,
	/// carrying forward every field the replacement does not touch
	/// (including variant-specific metadata such as comments).
	fn derive_successor(&self, entries: Entries, qualifiers: QualifierMap) -> Self;
}

fn snapshot_ptr<S>(opt: Option<&Arc<S>>) -> *const S {
	opt.map_or(ptr::null(), |arc| Arc::as_ptr(arc))
}

/// Derives and installs a successor of the currently authoritative snapshot.
///
/// `derive` is re-run against the fresh snapshot on every lost swap round, so
/// a successful install is always based on the state it replaced. Fails only
/// when the slot has been emptied by removal.
pub(crate) fn install<S, F>(slot: &SelfRef<S>, name: &str, derive: F) -> Result<Arc<S>>
where
	S: GroupSnapshot,
	F: Fn(&S) -> S,
{
	loop {
		let guard = slot.slot.load();
		let Some(cur) = guard.as_ref() else {
			return Err(StoreError::GroupRemoved(name.into()));
		};
		let next = Arc::new(derive(cur));
		let prev = slot.slot.compare_and_swap(&guard, Some(Arc::clone(&next)));
		if snapshot_ptr(prev.as_ref()) == snapshot_ptr(guard.as_ref()) {
			return Ok(next);
		}
		tracing::trace!(group = %name, "lost snapshot install race, retrying");
	}
}

#[cfg(test)]
mod tests {
	use std::thread;

	use super::*;

	#[derive(Debug)]
	struct Counter {
		applied: Vec<usize>,
		slot: Arc<SelfRef<Self>>,
	}

	impl GroupSnapshot for Counter {
		fn name(&self) -> &str {
			"counter"
		}

		fn qualifiers(&self) -> &QualifierMap {
			unimplemented!("not used by the install loop")
		}

		fn entries(&self) -> &Entries {
			unimplemented!("not used by the install loop")
		}

		fn self_ref(&self) -> &SelfRef<Self> {
			&self.slot
		}

		fn derive_successor(&self, _entries: Entries, _qualifiers: QualifierMap) -> Self {
			Self { applied: self.applied.clone(), slot: Arc::clone(&self.slot) }
		}
	}

	fn seeded() -> Arc<SelfRef<Counter>> {
		let slot = Arc::new(SelfRef::empty());
		slot.seed(Arc::new(Counter { applied: Vec::new(), slot: Arc::clone(&slot) }));
		slot
	}

	#[test]
	fn install_replaces_current() {
		let slot = seeded();
		let first = slot.current().unwrap();

		let second = install(&slot, "counter", |cur: &Counter| {
			let mut applied = cur.applied.clone();
			applied.push(1);
			Counter { applied, slot: Arc::clone(&cur.slot) }
		})
		.unwrap();

		assert!(slot.is_current(&second));
		assert!(!slot.is_current(&first));
		assert_eq!(second.applied, [1]);
		// The displaced snapshot is stale but still a valid readable value.
		assert!(first.applied.is_empty());
	}

	#[test]
	fn concurrent_installs_lose_no_update() {
		let slot = seeded();
		let threads = 8;
		let per_thread = 50;

		thread::scope(|scope| {
			for t in 0..threads {
				let slot = &slot;
				scope.spawn(move || {
					for i in 0..per_thread {
						install(slot, "counter", |cur: &Counter| {
							let mut applied = cur.applied.clone();
							applied.push(t * per_thread + i);
							Counter { applied, slot: Arc::clone(&cur.slot) }
						})
						.unwrap();
					}
				});
			}
		});

		let last = slot.current().unwrap();
		assert_eq!(last.applied.len(), threads * per_thread);
		let mut seen = last.applied.clone();
		seen.sort_unstable();
		let expected: Vec<usize> = (0..threads * per_thread).collect();
		assert_eq!(seen, expected);
	}

	#[test]
	fn install_after_take_reports_removed() {
		let slot = seeded();
		assert!(slot.take().is_some());
		assert!(slot.take().is_none());

		let err = install(&slot, "counter", |cur: &Counter| cur.derive_successor(
			Entries::raw(Vec::<String>::new()),
			QualifierMap::new(),
		))
		.unwrap_err();
		assert!(matches!(err, StoreError::GroupRemoved(_)));
	}
}
