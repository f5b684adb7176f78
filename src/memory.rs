//! Plain in-memory backend: the base mutation protocol without persistence.

use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::entries::Entries;
use crate::error::{Result, StoreError};
use crate::group::{self, GroupSnapshot, SelfRef};
use crate::list::MatcherList;
use crate::qualifier::QualifierMap;

/// Immutable snapshot of one matcher group, without file metadata.
///
/// Mutations derive a successor and atomically install it in the shared
/// [`SelfRef`] slot; the snapshot a caller holds keeps reporting the state it
/// was constructed with even after it goes stale.
pub struct MemoryMatcherGroup<L: MatcherList = MemoryMatcherList> {
	name: Box<str>,
	qualifiers: QualifierMap,
	entries: Entries,
	self_ref: Arc<SelfRef<Self>>,
	list_ref: Weak<L>,
}

impl<L: MatcherList> MemoryMatcherGroup<L> {
	pub(crate) fn new(
		name: Box<str>,
		qualifiers: QualifierMap,
		entries: Entries,
		self_ref: Arc<SelfRef<Self>>,
		list_ref: Weak<L>,
	) -> Self {
		Self { name, qualifiers, entries, self_ref, list_ref }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn qualifiers(&self) -> &QualifierMap {
		&self.qualifiers
	}

	pub fn entries(&self) -> &Entries {
		&self.entries
	}

	/// The currently authoritative snapshot of this logical group.
	pub fn current(&self) -> Option<Arc<Self>> {
		self.self_ref.current()
	}

	/// True when this snapshot is the currently installed one.
	pub fn is_current(&self) -> bool {
		self.self_ref.is_current(self)
	}

	/// Replaces the qualifiers, keeping the entries of whichever snapshot is
	/// current when the install wins its swap round.
	pub async fn set_qualifiers(&self, qualifiers: QualifierMap) -> Result<Arc<Self>> {
		group::install(&self.self_ref, &self.name, |cur| {
			cur.derive_successor(cur.entries.clone(), qualifiers.clone())
		})
	}

	/// Replaces the entries with a structured key/value payload.
	pub async fn set_entries(&self, entries: FxHashMap<String, String>) -> Result<Arc<Self>> {
		group::install(&self.self_ref, &self.name, |cur| {
			cur.derive_successor(Entries::Structured(entries.clone()), cur.qualifiers.clone())
		})
	}

	/// Replaces the entries with a raw line payload.
	pub async fn set_entry_lines(&self, lines: Vec<String>) -> Result<Arc<Self>> {
		group::install(&self.self_ref, &self.name, |cur| {
			cur.derive_successor(Entries::Raw(lines.clone()), cur.qualifiers.clone())
		})
	}

	/// Removes this logical group from the backing store.
	///
	/// Idempotent: resolves true iff the slot or the store index actually
	/// changed.
	pub async fn remove(&self) -> Result<bool> {
		let cleared = self.self_ref.take().is_some();
		let forgot = self.list_ref.upgrade().is_some_and(|list| list.forget(&self.name));
		Ok(cleared || forgot)
	}
}

impl<L: MatcherList> GroupSnapshot for MemoryMatcherGroup<L> {
	fn name(&self) -> &str {
		&self.name
	}

	fn qualifiers(&self) -> &QualifierMap {
		&self.qualifiers
	}

	fn entries(&self) -> &Entries {
		&self.entries
	}

	fn self_ref(&self) -> &SelfRef<Self> {
		&self.self_ref
	}

	fn derive_successor(&self, entries: Entries, qualifiers: QualifierMap) -> Self {
		Self {
			name: self.name.clone(),
			qualifiers,
			entries,
			self_ref: Arc::clone(&self.self_ref),
			list_ref: Weak::clone(&self.list_ref),
		}
	}
}

impl<L: MatcherList> fmt::Debug for MemoryMatcherGroup<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryMatcherGroup")
			.field("name", &self.name)
			.field("entries", &self.entries)
			.field("qualifiers", &self.qualifiers)
			.finish()
	}
}

/// In-memory store owning the current-version slots of its groups by name.
///
/// `save` is a no-op; this backend exists for callers that do not need
/// durability and as the reference implementation of the store contract.
pub struct MemoryMatcherList {
	groups: RwLock<FxHashMap<Box<str>, Arc<SelfRef<MemoryMatcherGroup>>>>,
}

impl MemoryMatcherList {
	pub fn new() -> Arc<Self> {
		Arc::new(Self { groups: RwLock::new(FxHashMap::default()) })
	}

	/// Registers a new logical group and seeds its first snapshot.
	pub fn create_group(
		self: &Arc<Self>,
		name: &str,
		qualifiers: QualifierMap,
		entries: Entries,
	) -> Result<Arc<MemoryMatcherGroup>> {
		let mut groups = self.groups.write();
		if groups.contains_key(name) {
			return Err(StoreError::GroupExists(name.into()));
		}
		let slot = Arc::new(SelfRef::empty());
		let snapshot = Arc::new(MemoryMatcherGroup::new(
			name.into(),
			qualifiers,
			entries,
			Arc::clone(&slot),
			Arc::downgrade(self),
		));
		slot.seed(Arc::clone(&snapshot));
		groups.insert(name.into(), slot);
		Ok(snapshot)
	}

	/// Current snapshot of the named group, if registered and live.
	pub fn get(&self, name: &str) -> Option<Arc<MemoryMatcherGroup>> {
		self.groups.read().get(name).and_then(|slot| slot.current())
	}

	pub fn len(&self) -> usize {
		self.groups.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.groups.read().is_empty()
	}
}

#[async_trait]
impl MatcherList for MemoryMatcherList {
	async fn save(&self) -> io::Result<()> {
		Ok(())
	}

	fn forget(&self, name: &str) -> bool {
		self.groups.write().remove(name).is_some()
	}
}

impl fmt::Debug for MemoryMatcherList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MemoryMatcherList{{groups={}}}", self.groups.read().len())
	}
}
