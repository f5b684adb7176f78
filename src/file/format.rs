//! Sectioned text format with verbatim comment capture.
//!
//! ```text
//! # header comment            <- attaches to the next group
//! [default world=nether]      <- name, then qualifier assignments
//! # note                      <- attaches to the next entry
//! a = 1
//! ```
//!
//! A group whose entry lines all contain ` = ` is parsed into a structured
//! key/value payload; any other group keeps its lines verbatim as a raw
//! payload, with entry comments keyed on the whole line.
//!
//! Qualifier values that contain whitespace, quotes, backslashes, or `]` are
//! written double-quoted with backslash escapes (`\"`, `\\`, `\n`, `\r`,
//! `\t`) and unescaped on parse. Entry payloads and comments have no escape
//! syntax, so [`check_group_name`], [`check_qualifiers`], [`check_entries`]
//! and [`check_comments`] reject values the format could not re-read; the
//! file backend applies them before installing a snapshot, keeping every
//! saved file loadable.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::entries::Entries;
use crate::error::{Result, StoreError};
use crate::list::MatcherList;
use crate::qualifier::{Qualifier, QualifierMap};

use super::{EntryComments, FileMatcherGroup};

/// One group as read from the backing file.
#[derive(Debug)]
pub(super) struct ParsedGroup {
	pub name: Box<str>,
	pub qualifiers: QualifierMap,
	pub entries: Entries,
	pub comments: Option<Vec<String>>,
	pub entry_comments: Option<EntryComments>,
}

struct GroupBuilder {
	name: Box<str>,
	qualifiers: QualifierMap,
	comments: Option<Vec<String>>,
	lines: Vec<(String, Vec<String>)>,
}

impl GroupBuilder {
	fn finish(self) -> ParsedGroup {
		let pairs: Option<Vec<(&str, &str)>> =
			self.lines.iter().map(|(line, _)| line.split_once(" = ")).collect();

		let mut entry_comments: EntryComments = IndexMap::new();
		let entries = match pairs {
			Some(pairs) => {
				let mut map = FxHashMap::default();
				for ((key, value), (_, comments)) in pairs.into_iter().zip(&self.lines) {
					let key = key.trim_end();
					if !comments.is_empty() {
						entry_comments.entry(key.to_string()).or_default().extend_from_slice(comments);
					}
					map.insert(key.to_string(), value.trim_start().to_string());
				}
				Entries::Structured(map)
			}
			None => {
				let mut lines = Vec::with_capacity(self.lines.len());
				for (line, comments) in self.lines {
					if !comments.is_empty() {
						entry_comments.entry(line.clone()).or_default().extend(comments);
					}
					lines.push(line);
				}
				Entries::Raw(lines)
			}
		};

		ParsedGroup {
			name: self.name,
			qualifiers: self.qualifiers,
			entries,
			comments: self.comments,
			entry_comments: (!entry_comments.is_empty()).then_some(entry_comments),
		}
	}
}

/// Splits the inside of a `[...]` header into the group name and qualifier
/// assignments, unescaping quoted values.
fn parse_header(inner: &str, line: usize) -> Result<(Box<str>, QualifierMap)> {
	let mut chars = inner.chars().peekable();

	while chars.peek().is_some_and(|c| c.is_whitespace()) {
		chars.next();
	}
	let mut name = String::new();
	while let Some(&c) = chars.peek() {
		if c.is_whitespace() {
			break;
		}
		name.push(c);
		chars.next();
	}
	if name.is_empty() {
		return Err(StoreError::Parse { line, message: "group header has no name".to_string() });
	}

	let mut qualifiers = QualifierMap::new();
	loop {
		while chars.peek().is_some_and(|c| c.is_whitespace()) {
			chars.next();
		}
		if chars.peek().is_none() {
			break;
		}

		let mut key = String::new();
		while let Some(&c) = chars.peek() {
			if c == '=' || c.is_whitespace() {
				break;
			}
			key.push(c);
			chars.next();
		}
		if key.is_empty() || chars.next() != Some('=') {
			return Err(StoreError::Parse {
				line,
				message: format!("malformed qualifier {key:?}, expected key=value"),
			});
		}

		let value = if chars.peek() == Some(&'"') {
			chars.next();
			let mut value = String::new();
			loop {
				match chars.next() {
					None => {
						return Err(StoreError::Parse {
							line,
							message: format!("unterminated quoted value for qualifier {key:?}"),
						});
					}
					Some('"') => break,
					Some('\\') => match chars.next() {
						Some('"') => value.push('"'),
						Some('\\') => value.push('\\'),
						Some('n') => value.push('\n'),
						Some('r') => value.push('\r'),
						Some('t') => value.push('\t'),
						other => {
							return Err(StoreError::Parse {
								line,
								message: format!("unknown escape {other:?} in qualifier {key:?}"),
							});
						}
					},
					Some(c) => value.push(c),
				}
			}
			value
		} else {
			let mut value = String::new();
			while let Some(&c) = chars.peek() {
				if c.is_whitespace() {
					break;
				}
				value.push(c);
				chars.next();
			}
			value
		};
		qualifiers.insert(Qualifier::from_key(&key), value);
	}
	Ok((name.into(), qualifiers))
}

/// Parses a whole backing file into its groups.
pub(super) fn parse(text: &str) -> Result<Vec<ParsedGroup>> {
	let mut groups = Vec::new();
	let mut current: Option<GroupBuilder> = None;
	let mut pending_comments: Vec<String> = Vec::new();

	for (idx, raw) in text.lines().enumerate() {
		let line_no = idx + 1;
		let line = raw.trim();

		if line.is_empty() {
			continue;
		}
		if line.starts_with('#') {
			pending_comments.push(line.to_string());
			continue;
		}
		if let Some(inner) = line.strip_prefix('[') {
			let Some(inner) = inner.strip_suffix(']') else {
				return Err(StoreError::Parse {
					line: line_no,
					message: "unterminated group header".to_string(),
				});
			};
			if let Some(done) = current.take() {
				groups.push(done.finish());
			}

			let (name, qualifiers) = parse_header(inner, line_no)?;
			current = Some(GroupBuilder {
				name,
				qualifiers,
				comments: (!pending_comments.is_empty()).then(|| std::mem::take(&mut pending_comments)),
				lines: Vec::new(),
			});
			continue;
		}

		let Some(builder) = current.as_mut() else {
			return Err(StoreError::Parse {
				line: line_no,
				message: "entry line before any group header".to_string(),
			});
		};
		builder.lines.push((line.to_string(), std::mem::take(&mut pending_comments)));
	}

	if let Some(done) = current.take() {
		groups.push(done.finish());
	}
	Ok(groups)
}

fn write_qualifier_value(out: &mut String, value: &str) {
	let needs_quoting = value.is_empty()
		|| value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == ']');
	if !needs_quoting {
		out.push_str(value);
		return;
	}
	out.push('"');
	for c in value.chars() {
		match c {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			c => out.push(c),
		}
	}
	out.push('"');
}

/// Serializes live snapshots back to file text, reattaching comments.
///
/// Structured entries and qualifier values are emitted in sorted order so the
/// output is deterministic; raw lines keep their own order.
pub(super) fn serialize<L: MatcherList>(groups: &[Arc<FileMatcherGroup<L>>]) -> String {
	let mut out = String::new();
	for (i, group) in groups.iter().enumerate() {
		if i > 0 {
			out.push('\n');
		}
		if let Some(comments) = group.comments() {
			for line in comments {
				out.push_str(line);
				out.push('\n');
			}
		}

		out.push('[');
		out.push_str(group.name());
		for (qualifier, values) in group.qualifiers().sorted_pairs() {
			for value in values {
				out.push(' ');
				out.push_str(qualifier.as_str());
				out.push('=');
				write_qualifier_value(&mut out, value);
			}
		}
		out.push_str("]\n");

		match group.entries() {
			Entries::Structured(map) => {
				let mut keys: Vec<&String> = map.keys().collect();
				keys.sort_unstable();
				for key in keys {
					push_entry_comments(&mut out, group.entry_comments(), key);
					out.push_str(key);
					out.push_str(" = ");
					out.push_str(&map[key]);
					out.push('\n');
				}
			}
			Entries::Raw(lines) => {
				for line in lines {
					push_entry_comments(&mut out, group.entry_comments(), line);
					out.push_str(line);
					out.push('\n');
				}
			}
		}
	}
	out
}

fn push_entry_comments(out: &mut String, comments: Option<&EntryComments>, key: &str) {
	if let Some(all) = comments
		&& let Some(lines) = all.get(key)
	{
		for line in lines {
			out.push_str(line);
			out.push('\n');
		}
	}
}

fn unrepresentable(what: String) -> StoreError {
	StoreError::Unrepresentable(what)
}

/// Rejects group names the header grammar cannot carry.
pub(super) fn check_group_name(name: &str) -> Result<()> {
	if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == ']') {
		return Err(unrepresentable(format!("group name {name:?}")));
	}
	Ok(())
}

/// Rejects qualifier keys the header grammar cannot carry. Values are always
/// representable through quoting.
pub(super) fn check_qualifiers(qualifiers: &QualifierMap) -> Result<()> {
	for (qualifier, _) in qualifiers.iter() {
		let key = qualifier.as_str();
		if key.is_empty()
			|| key.contains(|c: char| {
				c.is_whitespace() || c == '=' || c == '"' || c == '\\' || c == ']'
			}) {
			return Err(unrepresentable(format!("qualifier key {key:?}")));
		}
	}
	Ok(())
}

/// Rejects entry payloads a save/load round trip would drop or misread:
/// embedded line breaks, comment- or header-shaped lines, keys or values the
/// line trimming and ` = ` split would alter.
pub(super) fn check_entries(entries: &Entries) -> Result<()> {
	match entries {
		Entries::Structured(map) => {
			for (key, value) in map {
				if key.is_empty()
					|| key.trim() != key
					|| key.contains('\n')
					|| key.contains('\r')
					|| key.contains(" = ")
					|| key.starts_with('#')
					|| key.starts_with('[')
				{
					return Err(unrepresentable(format!("entry key {key:?}")));
				}
				if value.is_empty()
					|| value.trim() != value
					|| value.contains('\n')
					|| value.contains('\r')
				{
					return Err(unrepresentable(format!("value {value:?} for entry {key:?}")));
				}
			}
		}
		Entries::Raw(lines) => {
			for line in lines {
				if line.is_empty()
					|| line.trim() != line
					|| line.contains('\n')
					|| line.contains('\r')
					|| line.starts_with('#')
					|| line.starts_with('[')
				{
					return Err(unrepresentable(format!("raw entry line {line:?}")));
				}
			}
		}
	}
	Ok(())
}

/// Rejects comment lines the parser would not hand back verbatim.
pub(super) fn check_comments<'a>(lines: impl IntoIterator<Item = &'a String>) -> Result<()> {
	for line in lines {
		if !line.starts_with('#') || line.trim_end() != line || line.contains('\n') {
			return Err(unrepresentable(format!("comment line {line:?}")));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::sync::Weak;

	use crate::group::SelfRef;

	use super::*;

	const FIXTURE: &str = "\
# header
# second header line
[default world=nether world=end]
# note
a = 1
b = 2

[flat until=2030-01-01]
modifyworld.* true
# trailing note
some raw line
";

	fn snapshots(parsed: Vec<ParsedGroup>) -> Vec<Arc<FileMatcherGroup>> {
		parsed
			.into_iter()
			.map(|group| {
				let slot = Arc::new(SelfRef::empty());
				let snapshot = Arc::new(FileMatcherGroup {
					name: group.name,
					qualifiers: group.qualifiers,
					entries: group.entries,
					comments: group.comments,
					entry_comments: group.entry_comments,
					self_ref: Arc::clone(&slot),
					list_ref: Weak::new(),
				});
				slot.seed(Arc::clone(&snapshot));
				snapshot
			})
			.collect()
	}

	#[test]
	fn parses_structured_and_raw_groups() {
		let groups = parse(FIXTURE).unwrap();
		assert_eq!(groups.len(), 2);

		let default = &groups[0];
		assert_eq!(&*default.name, "default");
		assert!(default.qualifiers.contains(&Qualifier::World, "nether"));
		assert!(default.qualifiers.contains(&Qualifier::World, "end"));
		let map = default.entries.as_structured().unwrap();
		assert_eq!(map["a"], "1");
		assert_eq!(map["b"], "2");
		assert_eq!(
			default.comments.as_deref(),
			Some(&["# header".to_string(), "# second header line".to_string()][..])
		);
		assert_eq!(
			default.entry_comments.as_ref().unwrap()["a"],
			["# note".to_string()]
		);

		let flat = &groups[1];
		let lines = flat.entries.as_raw().unwrap();
		assert_eq!(lines, ["modifyworld.* true", "some raw line"]);
		assert_eq!(
			flat.entry_comments.as_ref().unwrap()["some raw line"],
			["# trailing note".to_string()]
		);
		assert!(flat.comments.is_none());
	}

	#[test]
	fn group_with_any_unsplittable_line_is_raw() {
		let groups = parse("[mixed]\na = 1\nnot a pair\n").unwrap();
		assert_eq!(groups[0].entries.as_raw().unwrap().len(), 2);
	}

	#[test]
	fn errors_carry_line_numbers() {
		let err = parse("[ok]\na = 1\n[broken\n").unwrap_err();
		assert!(matches!(err, StoreError::Parse { line: 3, .. }));

		let err = parse("# comment\norphan line\n").unwrap_err();
		assert!(matches!(err, StoreError::Parse { line: 2, .. }));

		let err = parse("[name bad-qualifier]\n").unwrap_err();
		assert!(matches!(err, StoreError::Parse { line: 1, .. }));

		let err = parse("[name world=\"unterminated]\n").unwrap_err();
		assert!(matches!(err, StoreError::Parse { line: 1, .. }));
	}

	#[test]
	fn empty_group_parses_as_structured() {
		let groups = parse("[empty]\n").unwrap();
		assert_eq!(groups[0].entries.as_structured().map(|m| m.len()), Some(0));
	}

	#[test]
	fn quoted_qualifier_values_unescape() {
		let groups = parse("[g world=\"the end\" tag=\"a\\\"b\\\\c\\nd\"]\n").unwrap();
		let quals = &groups[0].qualifiers;
		assert!(quals.contains(&Qualifier::World, "the end"));
		assert!(quals.contains(&Qualifier::from_key("tag"), "a\"b\\c\nd"));
	}

	#[test]
	fn awkward_qualifier_values_round_trip() {
		let mut qualifiers = QualifierMap::new();
		qualifiers.insert(Qualifier::World, "the end");
		qualifiers.insert(Qualifier::World, "plain");
		qualifiers.insert(Qualifier::from_key("tag"), "a\"b\\c");
		qualifiers.insert(Qualifier::from_key("note"), "line\nbreak\tdone");
		qualifiers.insert(Qualifier::from_key("blank"), "");

		let groups = snapshots(vec![ParsedGroup {
			name: "g".into(),
			qualifiers: qualifiers.clone(),
			entries: Entries::structured([("a", "1")]),
			comments: None,
			entry_comments: None,
		}]);
		let reparsed = parse(&serialize(&groups)).unwrap();
		assert_eq!(reparsed[0].qualifiers, qualifiers);
	}

	#[test]
	fn checks_reject_unrepresentable_payloads() {
		assert!(check_group_name("default").is_ok());
		assert!(check_group_name("two words").is_err());
		assert!(check_group_name("").is_err());

		let spaced: QualifierMap = [(Qualifier::from_key("bad key"), "v")].into_iter().collect();
		assert!(check_qualifiers(&spaced).is_err());
		let quoted_value: QualifierMap = [(Qualifier::World, "the end")].into_iter().collect();
		assert!(check_qualifiers(&quoted_value).is_ok());

		assert!(check_entries(&Entries::structured([("a", "1")])).is_ok());
		assert!(check_entries(&Entries::structured([("a", "line\nbreak")])).is_err());
		assert!(check_entries(&Entries::structured([("# key", "1")])).is_err());
		assert!(check_entries(&Entries::structured([("a = b", "1")])).is_err());
		assert!(check_entries(&Entries::structured([("a", "")])).is_err());

		assert!(check_entries(&Entries::raw(["modifyworld.* true"])).is_ok());
		assert!(check_entries(&Entries::raw(["# looks like a comment"])).is_err());
		assert!(check_entries(&Entries::raw(["[looks like a header]"])).is_err());
		assert!(check_entries(&Entries::raw([" padded "])).is_err());

		assert!(check_comments(&["# fine".to_string()]).is_ok());
		assert!(check_comments(&["no marker".to_string()]).is_err());
		assert!(check_comments(&["# trailing ".to_string()]).is_err());
	}
}
