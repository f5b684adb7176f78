//! File-backed matcher store: comment-carrying snapshots that persist on
//! every successful mutation.
//!
//! [`FileMatcherGroup`] adds the metadata a text backing file carries beyond
//! entries and qualifiers (a comment block for the group, comment lines per
//! entry) and decorates the base mutation protocol with a best-effort save:
//! once a mutation's install has won, the owning [`FileMatcherList`] is asked
//! to flush, and a flush failure is logged rather than surfaced — the
//! in-memory snapshot is already authoritative, only durability degraded.
//!
//! Payloads the text format could not re-read (comment- or header-shaped raw
//! lines, embedded line breaks, names or qualifier keys the header grammar
//! cannot carry) are rejected with [`StoreError::Unrepresentable`] before any
//! snapshot is installed, so a saved file always loads back.

mod format;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::ptr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::entries::Entries;
use crate::error::{Result, StoreError};
use crate::group::{self, GroupSnapshot, SelfRef};
use crate::list::MatcherList;
use crate::qualifier::QualifierMap;

/// Comment lines attached to individual entries, keyed by entry key (or by
/// the whole line for raw payloads). Insertion ordered.
pub type EntryComments = IndexMap<String, Vec<String>>;

/// Immutable snapshot of one matcher group plus its file metadata.
pub struct FileMatcherGroup<L: MatcherList = FileMatcherList> {
	name: Box<str>,
	qualifiers: QualifierMap,
	entries: Entries,
	comments: Option<Vec<String>>,
	entry_comments: Option<EntryComments>,
	self_ref: Arc<SelfRef<Self>>,
	list_ref: Weak<L>,
}

impl<L: MatcherList> FileMatcherGroup<L> {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn qualifiers(&self) -> &QualifierMap {
		&self.qualifiers
	}

	pub fn entries(&self) -> &Entries {
		&self.entries
	}

	/// Comment block attached to the group as a whole, if any was loaded.
	pub fn comments(&self) -> Option<&[String]> {
		self.comments.as_deref()
	}

	/// Per-entry comment lines, if any were loaded.
	pub fn entry_comments(&self) -> Option<&EntryComments> {
		self.entry_comments.as_ref()
	}

	/// The currently authoritative snapshot of this logical group.
	pub fn current(&self) -> Option<Arc<Self>> {
		self.self_ref.current()
	}

	/// True when this snapshot is the currently installed one.
	pub fn is_current(&self) -> bool {
		self.self_ref.is_current(self)
	}

	/// Replaces the qualifiers and persists, keeping entries and comments.
	///
	/// Qualifier keys the header grammar cannot carry are rejected before
	/// anything is installed; values are always representable (quoted).
	pub async fn set_qualifiers(&self, qualifiers: QualifierMap) -> Result<Arc<Self>> {
		format::check_qualifiers(&qualifiers)?;
		let next = group::install(&self.self_ref, &self.name, |cur| {
			cur.derive_successor(cur.entries.clone(), qualifiers.clone())
		})?;
		self.save_best_effort().await;
		Ok(next)
	}

	/// Replaces the entries with a structured key/value payload and persists.
	pub async fn set_entries(&self, entries: FxHashMap<String, String>) -> Result<Arc<Self>> {
		let entries = Entries::Structured(entries);
		format::check_entries(&entries)?;
		let next = group::install(&self.self_ref, &self.name, |cur| {
			cur.derive_successor(entries.clone(), cur.qualifiers.clone())
		})?;
		self.save_best_effort().await;
		Ok(next)
	}

	/// Replaces the entries with a raw line payload and persists.
	pub async fn set_entry_lines(&self, lines: Vec<String>) -> Result<Arc<Self>> {
		let entries = Entries::Raw(lines);
		format::check_entries(&entries)?;
		let next = group::install(&self.self_ref, &self.name, |cur| {
			cur.derive_successor(entries.clone(), cur.qualifiers.clone())
		})?;
		self.save_best_effort().await;
		Ok(next)
	}

	/// Removes this logical group from the backing store, persisting only
	/// when something actually changed.
	pub async fn remove(&self) -> Result<bool> {
		let cleared = self.self_ref.take().is_some();
		let forgot = self.list_ref.upgrade().is_some_and(|list| list.forget(&self.name));
		let changed = cleared || forgot;
		if changed {
			self.save_best_effort().await;
		}
		Ok(changed)
	}

	/// Persists via the owning store, converting any failure into a log
	/// record. The caller's mutation has already succeeded and must not see
	/// durability faults.
	async fn save_best_effort(&self) {
		let Some(list) = self.list_ref.upgrade() else {
			tracing::warn!(group = %self.name, "backing store dropped, skipping save");
			return;
		};
		if let Err(error) = list.save().await {
			tracing::error!(group = ?self, %error, "error while saving matcher group");
		}
	}
}

impl<L: MatcherList> GroupSnapshot for FileMatcherGroup<L> {
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
			comments: self.comments.clone(),
			entry_comments: self.entry_comments.clone(),
			self_ref: Arc::clone(&self.self_ref),
			list_ref: Weak::clone(&self.list_ref),
		}
	}
}

impl<L: MatcherList> fmt::Debug for FileMatcherGroup<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "FileMatcherGroup{{name={}", self.name)?;
		match self.self_ref.current() {
			None => write!(f, ",self_ref=absent")?,
			Some(cur) if ptr::eq(Arc::as_ptr(&cur), self) => write!(f, ",self_ref=me")?,
			Some(cur) => write!(f, ",self_ref={cur:?}")?,
		}
		match self.list_ref.upgrade() {
			Some(list) => write!(f, ",list_ref={list:?}")?,
			None => write!(f, ",list_ref=dropped")?,
		}
		write!(
			f,
			",entries={:?},qualifiers={:?},comments={:?},entry_comments={:?}}}",
			self.entries, self.qualifiers, self.comments, self.entry_comments
		)
	}
}

/// Store owning the matcher groups of one backing file, in file order.
///
/// Saves requested by independent mutation continuations are serialized by an
/// async mutex; each save writes the then-current snapshot of every live
/// group, so a late save never resurrects older state.
pub struct FileMatcherList {
	path: PathBuf,
	groups: RwLock<IndexMap<Box<str>, Arc<SelfRef<FileMatcherGroup>>>>,
	save_lock: AsyncMutex<()>,
}

impl FileMatcherList {
	/// Creates an empty store persisted at `path`.
	pub fn create(path: impl Into<PathBuf>) -> Arc<Self> {
		Arc::new(Self {
			path: path.into(),
			groups: RwLock::new(IndexMap::new()),
			save_lock: AsyncMutex::new(()),
		})
	}

	/// Loads a store from the file at `path`, reattaching parsed comments.
	pub async fn load(path: impl Into<PathBuf>) -> Result<Arc<Self>> {
		let path = path.into();
		let text = tokio::fs::read_to_string(&path)
			.await
			.map_err(|error| StoreError::Io { path: path.clone(), error })?;
		let parsed = format::parse(&text)?;

		let list = Self::create(path);
		{
			let mut groups = list.groups.write();
			for group in parsed {
				let slot = Arc::new(SelfRef::empty());
				let name = group.name.clone();
				let snapshot = Arc::new(FileMatcherGroup {
					name: group.name,
					qualifiers: group.qualifiers,
					entries: group.entries,
					comments: group.comments,
					entry_comments: group.entry_comments,
					self_ref: Arc::clone(&slot),
					list_ref: Arc::downgrade(&list),
				});
				slot.seed(snapshot);
				groups.insert(name, slot);
			}
		}
		Ok(list)
	}

	/// Registers a new logical group and seeds its first snapshot.
	///
	/// The group is not persisted until the next [`MatcherList::save`] (or
	/// the first mutation, which saves as a side effect).
	pub fn create_group(
		self: &Arc<Self>,
		name: &str,
		qualifiers: QualifierMap,
		entries: Entries,
		comments: Option<Vec<String>>,
		entry_comments: Option<EntryComments>,
	) -> Result<Arc<FileMatcherGroup>> {
		format::check_group_name(name)?;
		format::check_qualifiers(&qualifiers)?;
		format::check_entries(&entries)?;
		if let Some(comments) = &comments {
			format::check_comments(comments)?;
		}
		if let Some(entry_comments) = &entry_comments {
			format::check_comments(entry_comments.values().flatten())?;
		}

		let mut groups = self.groups.write();
		if groups.contains_key(name) {
			return Err(StoreError::GroupExists(name.into()));
		}
		let slot = Arc::new(SelfRef::empty());
		let snapshot = Arc::new(FileMatcherGroup {
			name: name.into(),
			qualifiers,
			entries,
			comments,
			entry_comments,
			self_ref: Arc::clone(&slot),
			list_ref: Arc::downgrade(self),
		});
		slot.seed(Arc::clone(&snapshot));
		groups.insert(name.into(), slot);
		Ok(snapshot)
	}

	/// Current snapshot of the named group, if registered and live.
	pub fn get(&self, name: &str) -> Option<Arc<FileMatcherGroup>> {
		self.groups.read().get(name).and_then(|slot| slot.current())
	}

	/// Registered group names, in file order.
	pub fn names(&self) -> Vec<Box<str>> {
		self.groups.read().keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.groups.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.groups.read().is_empty()
	}
}

#[async_trait]
impl MatcherList for FileMatcherList {
	async fn save(&self) -> io::Result<()> {
		let _serialized = self.save_lock.lock().await;
		let snapshots: Vec<Arc<FileMatcherGroup>> = {
			let groups = self.groups.read();
			groups.values().filter_map(|slot| slot.current()).collect()
		};
		let text = format::serialize(&snapshots);
		tokio::fs::write(&self.path, text).await
	}

	fn forget(&self, name: &str) -> bool {
		self.groups.write().shift_remove(name).is_some()
	}
}

impl fmt::Debug for FileMatcherList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"FileMatcherList{{path={},groups={}}}",
			self.path.display(),
			self.groups.read().len()
		)
	}
}
