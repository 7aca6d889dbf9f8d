use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::time::Instant;

use auditor_abstractions::tracing::info;
use rusqlite::TransactionBehavior;

use crate::model::{OpId, ParsedOp, TokenKind};
use crate::parser;
use crate::store::{self, OpRow, Result, Store};

/// Totals reported after one indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
	pub ops: i64,
	pub classes: usize,
	pub methods: usize,
}

// Progress pacing: report more often when someone is watching.
const PACE_INTERACTIVE: i64 = 65_536;
const PACE_BATCH: i64 = 131_072;

/// Indexes every smali file in the store's file table.
///
/// Runs once per analysis inside a single exclusive write transaction: ops are parsed, given dense
/// identifiers from a counter seeded at 1, and persisted; class ranges are gathered along the way;
/// the method map and the secondary indices are derived at the end. The resulting fact base is
/// immutable for the rest of the run.
pub fn analyze(store: &Store) -> Result<IndexSummary> {
	analyze_with_pacing(store, std::io::stdout().is_terminal())
}

/// As [`analyze`], with the progress pacing chosen by the caller.
pub fn analyze_with_pacing(store: &Store, interactive: bool) -> Result<IndexSummary> {
	let started = Instant::now();
	let pace = if interactive { PACE_INTERACTIVE } else { PACE_BATCH };

	let files = store.query().file_enum("smali/%.smali")?;

	let mut conn = store.lock();
	let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

	let mut classmap: BTreeSet<(OpId, OpId)> = BTreeSet::new();
	let mut base_id: OpId = 1;
	let mut analyzed_ops: i64 = 0;
	let mut last_seen: i64 = 0;

	for (_, blob) in &files {
		let text = String::from_utf8_lossy(blob);
		let mut rows: Vec<OpRow> = Vec::new();

		for parsed in parser::parse(&text) {
			analyzed_ops += 1;

			let op = match parsed {
				ParsedOp::Plain(op) => op,
				// Annotation and param payloads are captured by the parser but never indexed.
				ParsedOp::Annotation { .. } | ParsedOp::Param { .. } => continue,
			};
			if op.is(TokenKind::Directive, "line") {
				continue;
			}

			rows.push(OpRow { id: base_id, idx: 0, k: op.k, v: op.v });
			base_id += 1;
			for (i, p) in op.p.into_iter().enumerate() {
				rows.push(OpRow { id: base_id, idx: (i + 1) as u32, k: p.k, v: p.v });
				base_id += 1;
			}

			if analyzed_ops - last_seen > pace {
				let elapsed = started.elapsed().as_secs_f64();
				info!(ops = analyzed_ops, rate = format!("{:.02} ops/s", analyzed_ops as f64 / elapsed), "indexing");
				last_seen = analyzed_ops;
			}
		}

		store::op_store_ops(&tx, &rows)?;

		let class_head = rows.iter().find(|r| r.idx == 0 && r.k == TokenKind::Directive && r.v == "class");
		if let (Some(head), Some(last)) = (class_head, rows.last()) {
			classmap.insert((head.id, last.id));
		}
	}

	let ops: i64 = tx.query_row("select count(op) from ops", [], |row| row.get(0))?;
	info!(ops, "indexing: ops stored");

	let classes = store::op_store_classmap(&tx, &classmap)?;
	info!(classes, "indexing: classes mapped");

	let methods = store::op_generate_methodmap(&tx)?;
	info!(methods, "indexing: methods mapped");

	store::op_finalize(&tx)?;
	tx.commit()?;

	info!(ops, classes, methods, elapsed = format!("{:.02}s", started.elapsed().as_secs_f64()), "indexing: done");

	Ok(IndexSummary { ops, classes, methods })
}
