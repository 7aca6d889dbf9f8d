use std::collections::BTreeSet;
use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::issue::Issue;
use crate::model::{OpId, TokenKind};
use crate::query::Query;

/// Represents a failure of the underlying fact base.
///
/// Storage failures are fatal to the analysis; everything else in the pipeline degrades, this does
/// not.
#[derive(Error, Debug)]
pub enum StoreError {
	#[error("storage failure: {0}")]
	Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "
create table if not exists files (path text not null primary key, blob blob not null);
create table if not exists ops (op integer primary key, idx integer not null, t text not null, v text not null);
create table if not exists classes (first_op integer primary key, last_op integer not null, name text not null);
create table if not exists methods (first_op integer primary key, last_op integer not null, class_op integer not null, sig text not null);
create table if not exists issues (
	issue integer primary key,
	detector text not null,
	confidence text not null,
	cvss3_vector text not null,
	summary text not null,
	synopsis text,
	source text,
	row integer,
	col integer,
	info1 text,
	info2 text
);
create unique index if not exists issues_coalesce
	on issues (detector, summary, coalesce(source, ''), coalesce(info1, ''), coalesce(info2, ''));
";

/// The persistent fact base of one analysis: files, indexed ops, the derived class and method
/// maps, and the issue table.
///
/// The store is opened once per analysis and shared read-only between detectors; the `rusqlite`
/// connection is not `Sync`, so every access goes through one mutex. Issue emission is the sole
/// write path after indexing and is serialized by the same lock.
pub struct Store {
	conn: Mutex<Connection>,
}

impl Store {
	/// Opens (creating if needed) a store at the given path.
	pub fn open(path: impl AsRef<Path>) -> Result<Store> {
		Store::with_schema(Connection::open(path)?)
	}

	/// Opens a transient in-memory store.
	pub fn open_in_memory() -> Result<Store> {
		Store::with_schema(Connection::open_in_memory()?)
	}

	fn with_schema(conn: Connection) -> Result<Store> {
		conn.execute_batch(SCHEMA)?;
		Ok(Store { conn: Mutex::new(conn) })
	}

	pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> { self.conn.lock() }

	/// Returns the typed query surface over the current snapshot.
	pub fn query(&self) -> Query<'_> { Query::new(self) }

	/// Inserts (or replaces) a file blob. This is the ingestion side used by the unpacker and by
	/// test fixtures.
	pub fn file_put(&self, path: &str, blob: &[u8]) -> Result<()> {
		self.lock().execute("insert or replace into files (path, blob) values (?1, ?2)", params![path, blob])?;
		Ok(())
	}

	/// Counts the ops persisted so far.
	pub fn op_count_ops(&self) -> Result<i64> {
		let count = self.lock().query_row("select count(op) from ops", [], |row| row.get(0))?;
		Ok(count)
	}

	/// Appends an issue, coalescing duplicates carrying the same detector, summary, source and
	/// info fields. Returns `true` when the issue was new.
	pub fn issue_raise(&self, issue: &Issue) -> Result<bool> {
		let inserted = self.lock().execute(
			"insert or ignore into issues (detector, confidence, cvss3_vector, summary, synopsis, source, row, col, info1, info2)
			 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
			params![
				issue.detector_id,
				issue.confidence.as_str(),
				issue.cvss3_vector,
				issue.summary,
				issue.synopsis,
				issue.source,
				issue.row,
				issue.col,
				issue.info1,
				issue.info2,
			],
		)?;
		Ok(inserted == 1)
	}
}

/// One row of the `ops` table, as emitted by the indexer.
pub(crate) struct OpRow {
	pub id: OpId,
	pub idx: u32,
	pub k: TokenKind,
	pub v: String,
}

pub(crate) fn op_store_ops(conn: &Connection, rows: &[OpRow]) -> rusqlite::Result<()> {
	let mut stmt = conn.prepare_cached("insert into ops (op, idx, t, v) values (?1, ?2, ?3, ?4)")?;

	for row in rows {
		stmt.execute(params![row.id, row.idx, row.k.as_str(), row.v])?;
	}

	Ok(())
}

/// Persists the class ranges gathered during ingestion, resolving each class's descriptor from the
/// trailing token of its `.class` line. Returns the number of classes stored.
pub(crate) fn op_store_classmap(conn: &Connection, classmap: &BTreeSet<(OpId, OpId)>) -> rusqlite::Result<usize> {
	let mut stored = 0;

	for &(first_op, last_op) in classmap {
		let name = trailing_value_of_line(conn, first_op)?.unwrap_or_default();

		conn.execute(
			"insert or replace into classes (first_op, last_op, name) values (?1, ?2, ?3)",
			params![first_op, last_op, name],
		)?;
		stored += 1;
	}

	Ok(stored)
}

/// Scans the stored ops for `.method` .. `.end method` spans and persists the method map. Returns
/// the number of methods found.
pub(crate) fn op_generate_methodmap(conn: &Connection) -> rusqlite::Result<usize> {
	let starts: Vec<OpId> = {
		let mut stmt =
			conn.prepare("select op from ops where idx = 0 and t = 'directive' and v = 'method' order by op")?;
		let rows = stmt.query_map([], |row| row.get(0))?;
		rows.collect::<rusqlite::Result<_>>()?
	};
	let ends: Vec<OpId> = {
		let mut stmt = conn.prepare(
			"select a.op from ops a join ops b on b.op = a.op + 1
			 where a.idx = 0 and a.t = 'directive' and a.v = 'end' and b.v = 'method' order by a.op",
		)?;
		let rows = stmt.query_map([], |row| row.get(0))?;
		rows.collect::<rusqlite::Result<_>>()?
	};

	let mut generated = 0;
	let mut ends = ends.into_iter().peekable();

	for start in starts {
		while ends.peek().is_some_and(|&e| e < start) {
			ends.next();
		}
		let Some(end_head) = ends.next() else { break };

		// The span closes on the `method` token of the `.end method` line.
		let last_op = end_head + 1;
		let sig = trailing_value_of_line(conn, start)?.unwrap_or_default();
		let class_op: OpId = conn
			.query_row(
				"select first_op from classes where first_op <= ?1 and last_op >= ?1 limit 1",
				[start],
				|row| row.get(0),
			)
			.unwrap_or(0);

		conn.execute(
			"insert or replace into methods (first_op, last_op, class_op, sig) values (?1, ?2, ?3, ?4)",
			params![start, last_op, class_op, sig],
		)?;
		generated += 1;
	}

	Ok(generated)
}

/// Builds the secondary indices and refreshes the query planner statistics.
pub(crate) fn op_finalize(conn: &Connection) -> rusqlite::Result<()> {
	conn.execute_batch(
		"create index if not exists ops_head_v on ops (t, v);
		 analyze;",
	)
}

/// Returns the value of the last parameter token on the line headed by `head`, scanning forward
/// until the next head op.
pub(crate) fn trailing_value_of_line(conn: &Connection, head: OpId) -> rusqlite::Result<Option<String>> {
	let mut stmt = conn.prepare_cached("select idx, v from ops where op > ?1 order by op")?;
	let mut rows = stmt.query([head])?;
	let mut last = None;

	while let Some(row) = rows.next()? {
		let idx: i64 = row.get(0)?;
		if idx == 0 {
			break;
		}
		last = Some(row.get::<_, String>(1)?);
	}

	Ok(last)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::issue::Confidence;
	use pretty_assertions::assert_eq;

	#[test]
	fn file_round_trip() {
		let store = Store::open_in_memory().unwrap();

		store.file_put("smali/com/example/Foo.smali", b".class public Lcom/example/Foo;").unwrap();

		let blob = store.query().file_get("smali/com/example/Foo.smali").unwrap().unwrap();
		assert_eq!(blob, b".class public Lcom/example/Foo;".to_vec());
		assert_eq!(store.query().file_get("smali/absent.smali").unwrap(), None);
	}

	#[test]
	fn issue_duplicates_coalesce_on_insert() {
		let store = Store::open_in_memory().unwrap();
		let issue = Issue::new("security-log", Confidence::Tentative, "CVSS:3.0/AV:P/", "detected logging")
			.with_source(Some("Lcom/example/Foo;->bar()V".to_string()))
			.with_info1("Landroid/util/Log;->d");

		assert!(store.issue_raise(&issue).unwrap());
		assert!(!store.issue_raise(&issue).unwrap());
		assert_eq!(store.query().issues().unwrap().len(), 1);

		// A distinct info2 is a distinct issue.
		assert!(store.issue_raise(&issue.clone().with_info2("tag")).unwrap());
		assert_eq!(store.query().issues().unwrap().len(), 2);
	}
}
