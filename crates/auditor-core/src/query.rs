use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::issue::{Confidence, Issue};
use crate::model::{InvocationPattern, Op, OpId, TokenKind};
use crate::store::{Result, Store};

/// The span of one indexed method, as derived by the method map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRange {
	pub first_op: OpId,
	pub last_op: OpId,
	pub class_op: OpId,
	pub sig: String,
}

/// The typed read surface over an indexed store. This is the sole interface detectors use.
///
/// All queries are read-only and snapshot-consistent within one analysis run: the fact base is
/// written once by the indexer and never mutated afterwards.
pub struct Query<'a> {
	store: &'a Store,
}

impl<'a> Query<'a> {
	pub(crate) fn new(store: &'a Store) -> Query<'a> { Query { store } }

	/// Enumerates files whose path matches the given `LIKE` glob, in path order.
	pub fn file_enum(&self, glob: &str) -> Result<Vec<(String, Vec<u8>)>> {
		let conn = self.store.lock();
		let mut stmt = conn.prepare_cached("select path, blob from files where path like ?1 order by path")?;
		let rows = stmt.query_map([glob], |row| Ok((row.get(0)?, row.get(1)?)))?;

		Ok(rows.collect::<rusqlite::Result<_>>()?)
	}

	/// Retrieves a single file blob.
	pub fn file_get(&self, path: &str) -> Result<Option<Vec<u8>>> {
		let conn = self.store.lock();
		let blob =
			conn.query_row("select blob from files where path = ?1", [path], |row| row.get(0)).optional()?;

		Ok(blob)
	}

	/// Retrieves one op with its parameters attached, or `None` for an unknown identifier.
	pub fn op_get(&self, id: OpId) -> Result<Option<Op>> {
		let conn = self.store.lock();
		Ok(hydrate(&conn, id)?)
	}

	/// Locates ops whose head value begins with the pattern's opcode prefix and whose trailing
	/// parameter matches the pattern's regex, in op-id order.
	pub fn invocations(&self, pattern: &InvocationPattern) -> Result<Vec<Op>> {
		self.head_ops_matching(pattern, None, false)
	}

	/// As [`Query::invocations`], restricted to the class enclosing `op`.
	pub fn invocations_in_class(&self, op: &Op, pattern: &InvocationPattern) -> Result<Vec<Op>> {
		let range = self.class_range_of(op.id)?;
		match range {
			Some(range) => self.head_ops_matching(pattern, Some(range), false),
			None => Ok(Vec::new()),
		}
	}

	/// As [`Query::invocations`], over `const-*` ops only.
	pub fn consts(&self, pattern: &InvocationPattern) -> Result<Vec<Op>> {
		self.head_ops_matching(pattern, None, true)
	}

	/// As [`Query::consts`], restricted to the class enclosing `op`.
	pub fn consts_in_class(&self, op: &Op, pattern: &InvocationPattern) -> Result<Vec<Op>> {
		let range = self.class_range_of(op.id)?;
		match range {
			Some(range) => self.head_ops_matching(pattern, Some(range), true),
			None => Ok(Vec::new()),
		}
	}

	/// Locates method head ops whose signature contains `method_selector` inside classes whose
	/// descriptor contains `class_selector`.
	pub fn methods_in_class(&self, method_selector: &str, class_selector: &str) -> Result<Vec<Op>> {
		let heads: Vec<OpId> = {
			let conn = self.store.lock();
			let mut stmt = conn.prepare_cached(
				"select m.first_op from methods m join classes c on c.first_op = m.class_op
				 where m.sig like '%' || ?1 || '%' and c.name like '%' || ?2 || '%' order by m.first_op",
			)?;
			let rows = stmt.query_map(params![method_selector, class_selector], |row| row.get(0))?;
			rows.collect::<rusqlite::Result<_>>()?
		};

		self.hydrate_all(&heads)
	}

	/// Locates ops inside the method enclosing `method_op`.
	///
	/// A head op matches when its value starts with the pattern's prefix, or when any parameter
	/// value contains the prefix (which is how call sites mentioning a method name are found); a
	/// non-empty regex must additionally match the trailing parameter.
	pub fn matches_in_method(&self, method_op: &Op, pattern: &InvocationPattern) -> Result<Vec<Op>> {
		let Some(method) = self.method_of(method_op)? else { return Ok(Vec::new()) };

		let ops = self.head_ops_in(method.first_op, method.last_op)?;
		Ok(ops
			.into_iter()
			.filter(|op| {
				op.v.starts_with(&pattern.insn) || op.p.iter().any(|p| p.v.contains(&pattern.insn))
			})
			.filter(|op| pattern.value.as_str().is_empty() || pattern.value.is_match(op.target_value()))
			.collect())
	}

	/// Locates class head ops whose superclass or interface list matches the given expression.
	pub fn related_classes(&self, related: &Regex) -> Result<Vec<Op>> {
		let ranges: Vec<(OpId, OpId)> = {
			let conn = self.store.lock();
			let mut stmt = conn.prepare_cached("select first_op, last_op from classes order by first_op")?;
			let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
			rows.collect::<rusqlite::Result<_>>()?
		};

		let mut found = Vec::new();
		for (first_op, last_op) in ranges {
			let parents: Vec<OpId> = {
				let conn = self.store.lock();
				let mut stmt = conn.prepare_cached(
					"select op from ops where idx = 0 and t = 'directive' and v in ('super', 'implements')
					 and op >= ?1 and op <= ?2 order by op",
				)?;
				let rows = stmt.query_map(params![first_op, last_op], |row| row.get(0))?;
				rows.collect::<rusqlite::Result<_>>()?
			};

			for parent in self.hydrate_all(&parents)? {
				if related.is_match(parent.target_value()) {
					if let Some(class_op) = self.op_get(first_op)? {
						found.push(class_op);
					}
					break;
				}
			}
		}

		Ok(found)
	}

	/// Returns the head op of the class enclosing `op`, if any.
	pub fn class_of_method(&self, op: &Op) -> Result<Option<Op>> {
		match self.class_range_of(op.id)? {
			Some((first_op, _)) => self.op_get(first_op),
			None => Ok(None),
		}
	}

	/// Returns the descriptor of a class head op (`Lcom/example/Foo;`).
	pub fn class_name_of(&self, class_op: &Op) -> Option<String> {
		class_op.p.last().map(|p| p.v.clone())
	}

	/// Returns `L.../Class;->method(args)ret` for any op inside a method, or `None` outside one.
	pub fn qualname_of(&self, op: &Op) -> Result<Option<String>> {
		let conn = self.store.lock();
		let row = conn
			.query_row(
				"select coalesce(c.name, ''), m.sig from methods m left join classes c on c.first_op = m.class_op
				 where m.first_op <= ?1 and m.last_op >= ?1 limit 1",
				[op.id],
				|row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
			)
			.optional()?;

		Ok(row.map(|(class, sig)| format!("{class}->{sig}")))
	}

	/// Returns the method range enclosing `op` (`op` may be the method head itself).
	pub fn method_of(&self, op: &Op) -> Result<Option<MethodRange>> {
		let conn = self.store.lock();
		let row = conn
			.query_row(
				"select first_op, last_op, class_op, sig from methods
				 where first_op <= ?1 and last_op >= ?1 limit 1",
				[op.id],
				|row| {
					Ok(MethodRange {
						first_op: row.get(0)?,
						last_op: row.get(1)?,
						class_op: row.get(2)?,
						sig: row.get(3)?,
					})
				},
			)
			.optional()?;

		Ok(row)
	}

	/// Returns the class range containing the given op identifier.
	pub fn class_range_of(&self, id: OpId) -> Result<Option<(OpId, OpId)>> {
		let conn = self.store.lock();
		let row = conn
			.query_row(
				"select first_op, last_op from classes where first_op <= ?1 and last_op >= ?1 limit 1",
				[id],
				|row| Ok((row.get(0)?, row.get(1)?)),
			)
			.optional()?;

		Ok(row)
	}

	/// Returns all head ops in an op-id range, parameters attached, ascending.
	pub fn head_ops_in(&self, first_op: OpId, last_op: OpId) -> Result<Vec<Op>> {
		let heads: Vec<OpId> = {
			let conn = self.store.lock();
			let mut stmt = conn
				.prepare_cached("select op from ops where idx = 0 and op >= ?1 and op <= ?2 order by op")?;
			let rows = stmt.query_map(params![first_op, last_op], |row| row.get(0))?;
			rows.collect::<rusqlite::Result<_>>()?
		};

		self.hydrate_all(&heads)
	}

	/// Reads the whole issue table.
	pub fn issues(&self) -> Result<Vec<Issue>> {
		let conn = self.store.lock();
		let mut stmt = conn.prepare_cached(
			"select detector, confidence, cvss3_vector, summary, synopsis, source, row, col, info1, info2
			 from issues order by issue",
		)?;
		let rows = stmt.query_map([], issue_of_row)?;

		Ok(rows.collect::<rusqlite::Result<_>>()?)
	}

	/// Reads the distinct findings (one row per detector + summary + vector), for report grouping.
	pub fn findings_list(&self) -> Result<Vec<(String, String, Option<String>, String)>> {
		let conn = self.store.lock();
		let mut stmt = conn.prepare_cached(
			"select distinct detector, summary, synopsis, cvss3_vector from issues order by detector, summary",
		)?;
		let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?;

		Ok(rows.collect::<rusqlite::Result<_>>()?)
	}

	/// Reads the issues belonging to one finding group.
	pub fn issues_by_group(&self, detector: &str, summary: &str) -> Result<Vec<Issue>> {
		let conn = self.store.lock();
		let mut stmt = conn.prepare_cached(
			"select detector, confidence, cvss3_vector, summary, synopsis, source, row, col, info1, info2
			 from issues where detector = ?1 and summary = ?2 order by issue",
		)?;
		let rows = stmt.query_map(params![detector, summary], issue_of_row)?;

		Ok(rows.collect::<rusqlite::Result<_>>()?)
	}

	fn head_ops_matching(
		&self,
		pattern: &InvocationPattern,
		range: Option<(OpId, OpId)>,
		consts_only: bool,
	) -> Result<Vec<Op>> {
		let (first_op, last_op) = range.unwrap_or((1, OpId::MAX));
		let like = format!("{}%", pattern.insn);
		let heads: Vec<OpId> = {
			let conn = self.store.lock();
			let sql = if consts_only {
				"select op from ops where idx = 0 and t = 'id' and v like 'const%' and v like ?1
				 and op >= ?2 and op <= ?3 order by op"
			} else {
				"select op from ops where idx = 0 and t = 'id' and v like ?1
				 and op >= ?2 and op <= ?3 order by op"
			};
			let mut stmt = conn.prepare_cached(sql)?;
			let rows = stmt.query_map(params![like, first_op, last_op], |row| row.get(0))?;
			rows.collect::<rusqlite::Result<_>>()?
		};

		let ops = self.hydrate_all(&heads)?;
		Ok(ops.into_iter().filter(|op| pattern.value.is_match(op.target_value())).collect())
	}

	fn hydrate_all(&self, heads: &[OpId]) -> Result<Vec<Op>> {
		let conn = self.store.lock();
		let mut ops = Vec::with_capacity(heads.len());

		for &head in heads {
			if let Some(op) = hydrate(&conn, head)? {
				ops.push(op);
			}
		}

		Ok(ops)
	}
}

fn issue_of_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Issue> {
	Ok(Issue {
		detector_id: row.get(0)?,
		confidence: Confidence::parse(&row.get::<_, String>(1)?),
		cvss3_vector: row.get(2)?,
		summary: row.get(3)?,
		synopsis: row.get(4)?,
		source: row.get(5)?,
		row: row.get(6)?,
		col: row.get(7)?,
		info1: row.get(8)?,
		info2: row.get(9)?,
	})
}

/// Reads the op at `head` and attaches the parameter rows that follow it on the same line.
fn hydrate(conn: &Connection, head: OpId) -> rusqlite::Result<Option<Op>> {
	let row = conn
		.query_row("select idx, t, v from ops where op = ?1", [head], |row| {
			Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
		})
		.optional()?;
	let Some((idx, t, v)) = row else { return Ok(None) };

	let mut op = Op { k: TokenKind::parse(&t), v, p: Vec::new(), id: head, idx: idx as u32 };
	let mut stmt = conn.prepare_cached("select op, idx, t, v from ops where op > ?1 order by op")?;
	let mut rows = stmt.query([head])?;

	while let Some(row) = rows.next()? {
		let idx: i64 = row.get(1)?;
		if idx == 0 {
			break;
		}
		op.p.push(Op {
			k: TokenKind::parse(&row.get::<_, String>(2)?),
			v: row.get(3)?,
			p: Vec::new(),
			id: row.get(0)?,
			idx: idx as u32,
		});
	}

	Ok(Some(op))
}
