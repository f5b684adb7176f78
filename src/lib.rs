//! Lock-free snapshot store for qualifier-tagged permission matcher groups.
//!
//! A **matcher group** is an immutable snapshot of `{name, qualifiers,
//! entries}` for one logical group of permission entries. Mutation never
//! edits a snapshot: it derives a successor and atomically retargets the
//! group's shared [`SelfRef`] slot, so concurrent writers race on a single
//! compare-and-swap and readers holding an older snapshot keep a consistent
//! view of the state they loaded.
//!
//! Two backends share that protocol:
//!
//! - [`memory`]: plain in-memory groups with a no-op save, owned by a
//!   [`MemoryMatcherList`].
//! - [`file`]: groups that carry human-authored comments from a sectioned
//!   text file and chain a best-effort save onto every successful mutation,
//!   owned by a [`FileMatcherList`]. Save failures are logged (with the
//!   group's identity) and never surfaced as mutation failures.
//!
//! ```no_run
//! use matcher_store::{FileMatcherList, Qualifier, QualifierMap};
//!
//! # async fn demo() -> matcher_store::Result<()> {
//! let list = FileMatcherList::load("permissions.matcher").await?;
//! if let Some(group) = list.get("default") {
//!     let quals: QualifierMap = [(Qualifier::World, "nether")].into_iter().collect();
//!     let updated = group.set_qualifiers(quals).await?;
//!     assert!(updated.is_current());
//! }
//! # Ok(())
//! # }
//! ```

mod entries;
mod error;
pub mod file;
mod group;
mod list;
pub mod memory;
mod qualifier;

pub use entries::Entries;
pub use error::{Result, StoreError};
pub use file::{EntryComments, FileMatcherGroup, FileMatcherList};
pub use group::{GroupSnapshot, SelfRef};
pub use list::MatcherList;
pub use memory::{MemoryMatcherGroup, MemoryMatcherList};
pub use qualifier::{Qualifier, QualifierMap};
