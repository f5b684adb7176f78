//! Dual-shape entry payloads.

use rustc_hash::FxHashMap;

/// The entry payload of a matcher group, in whichever shape it was supplied.
///
/// Some backing formats store entries as parsed key/value pairs, others as
/// flat lines that have not been split yet. A successor snapshot always keeps
/// the variant of the payload it was constructed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entries {
	/// Parsed key/value permission entries.
	Structured(FxHashMap<String, String>),
	/// Unparsed lines kept verbatim.
	Raw(Vec<String>),
}

impl Entries {
	/// Builds a structured payload from key/value pairs.
	pub fn structured<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self::Structured(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	/// Builds a raw-lines payload.
	pub fn raw<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
		Self::Raw(lines.into_iter().map(Into::into).collect())
	}

	pub fn as_structured(&self) -> Option<&FxHashMap<String, String>> {
		match self {
			Self::Structured(map) => Some(map),
			Self::Raw(_) => None,
		}
	}

	pub fn as_raw(&self) -> Option<&[String]> {
		match self {
			Self::Structured(_) => None,
			Self::Raw(lines) => Some(lines),
		}
	}

	/// Number of entries regardless of shape.
	pub fn len(&self) -> usize {
		match self {
			Self::Structured(map) => map.len(),
			Self::Raw(lines) => lines.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shape_accessors_are_exclusive() {
		let structured = Entries::structured([("a", "1")]);
		assert!(structured.as_structured().is_some());
		assert!(structured.as_raw().is_none());

		let raw = Entries::raw(["modifyworld.* true"]);
		assert!(raw.as_raw().is_some());
		assert!(raw.as_structured().is_none());
		assert_eq!(raw.len(), 1);
	}
}
