//! Error types for store and group operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by matcher stores and groups.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The logical group was removed and no longer accepts mutations.
	#[error("matcher group {0:?} has been removed")]
	GroupRemoved(Box<str>),

	/// A group with the same name is already registered in the store.
	#[error("matcher group {0:?} already exists")]
	GroupExists(Box<str>),

	/// Error reading or writing the backing file.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// Path of the file that failed.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The backing file is malformed.
	#[error("parse error at line {line}: {message}")]
	Parse {
		/// One-based line number of the offending line.
		line: usize,
		message: String,
	},

	/// A value cannot be written to the backing file without corrupting it.
	#[error("not representable in the backing file: {0}")]
	Unrepresentable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
