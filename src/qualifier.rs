//! Contextual qualifier keys and the multi-valued map that scopes entries.

use rustc_hash::{FxHashMap, FxHashSet};

/// A contextual dimension used to scope which entries of a group apply.
///
/// Qualifiers are immutable value keys: two qualifiers are the same dimension
/// iff they compare equal. Dimensions not known to this crate round-trip
/// through [`Qualifier::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
	/// Entries scoped to a specific user.
	User,
	/// Entries scoped to a named group.
	Group,
	/// Entries scoped to a world.
	World,
	/// Entries valid until a point in time.
	Until,
	/// A free-form dimension carried verbatim from the backing format.
	Custom(Box<str>),
}

impl Qualifier {
	/// The key text used in the persisted representation.
	pub fn as_str(&self) -> &str {
		match self {
			Self::User => "user",
			Self::Group => "group",
			Self::World => "world",
			Self::Until => "until",
			Self::Custom(key) => key,
		}
	}

	/// Resolves a persisted key back to a qualifier, mapping unknown keys to
	/// [`Qualifier::Custom`].
	pub fn from_key(key: &str) -> Self {
		match key {
			"user" => Self::User,
			"group" => Self::Group,
			"world" => Self::World,
			"until" => Self::Until,
			other => Self::Custom(other.into()),
		}
	}
}

/// Multi-valued map from [`Qualifier`] to string values.
///
/// Value order within one qualifier is irrelevant; equality is set equality
/// per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualifierMap {
	inner: FxHashMap<Qualifier, FxHashSet<String>>,
}

impl QualifierMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds one value under a qualifier, keeping existing values.
	pub fn insert(&mut self, qualifier: Qualifier, value: impl Into<String>) {
		self.inner.entry(qualifier).or_default().insert(value.into());
	}

	/// Values recorded under a qualifier, if any.
	pub fn values(&self, qualifier: &Qualifier) -> Option<&FxHashSet<String>> {
		self.inner.get(qualifier)
	}

	/// True when `value` is recorded under `qualifier`.
	pub fn contains(&self, qualifier: &Qualifier, value: &str) -> bool {
		self.inner.get(qualifier).is_some_and(|set| set.contains(value))
	}

	/// Number of distinct qualifier keys.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Qualifier, &FxHashSet<String>)> {
		self.inner.iter()
	}

	/// Key/value pairs sorted by qualifier key then value, for deterministic
	/// serialization.
	pub fn sorted_pairs(&self) -> Vec<(&Qualifier, Vec<&str>)> {
		let mut keys: Vec<&Qualifier> = self.inner.keys().collect();
		keys.sort_by_key(|q| q.as_str());
		keys.into_iter()
			.map(|q| {
				let mut values: Vec<&str> = self.inner[q].iter().map(String::as_str).collect();
				values.sort_unstable();
				(q, values)
			})
			.collect()
	}
}

impl<V: Into<String>> FromIterator<(Qualifier, V)> for QualifierMap {
	fn from_iter<I: IntoIterator<Item = (Qualifier, V)>>(iter: I) -> Self {
		let mut map = Self::new();
		for (qualifier, value) in iter {
			map.insert(qualifier, value);
		}
		map
	}
}
