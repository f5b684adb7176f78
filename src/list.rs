//! Backing-store contract consumed by matcher groups.

use std::fmt;
use std::io;

use async_trait::async_trait;

/// The narrow contract a group needs from the store that owns it.
///
/// The store indexes groups by name, decides how saves are scheduled and
/// interleaved, and is the only party that touches durable storage. `save`
/// must tolerate concurrent invocation from the continuations of independent
/// groups.
#[async_trait]
pub trait MatcherList: fmt::Debug + Send + Sync + 'static {
	/// Flushes current in-memory state to durable storage.
	async fn save(&self) -> io::Result<()>;

	/// Detaches the named group from the store's index.
	///
	/// Returns true iff store state changed (false when already absent).
	fn forget(&self, name: &str) -> bool;
}
