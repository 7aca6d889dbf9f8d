use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

use crate::model::{Op, OpId, TokenKind};
use crate::store::Store;

/// The sole failure the solver signals: no unique constant value could be established for the
/// requested argument (divergent producers, a non-constant producer, or a dead register).
///
/// Detectors pattern-match on the `Result`; the solver never panics on malformed bytecode.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no unique constant value reaches the requested argument")]
pub struct NoSuchValueError;

/// Resolves the unique constant value reaching register-argument `index` of the invocation `site`.
///
/// Walks backward from the site through the enclosing method, following the most recent writer of
/// each register, resolving `move-*` chains, folding `const-*` literals and following
/// `iget-*`/`sget-*` loads to a unique field initializer inside the same class.
pub fn solved_constant_data_in_invocation(store: &Store, site: &Op, index: usize) -> Result<String, NoSuchValueError> {
	let reg = argument_register_of(site, index)?;
	let mut solver = Solver::for_site(store, site)?;
	let pos = solver.position_of(site.id)?;
	let writer = solver.recent_value_writer(pos, &reg)?;

	solver.resolve_constant_at(writer)
}

/// Returns the union of constant values over every statically reachable producer of the argument
/// register within the enclosing method. Empty when nothing resolves.
pub fn solved_possible_constant_data_in_invocation(store: &Store, site: &Op, index: usize) -> BTreeSet<String> {
	let mut out = BTreeSet::new();

	if let Ok(reg) = argument_register_of(site, index) {
		if let Ok(mut solver) = Solver::for_site(store, site) {
			for pos in 0..solver.ops.len() {
				if !writes_value(&solver.ops[pos], &reg) {
					continue;
				}
				solver.visited.clear();
				if let Ok(value) = solver.resolve_constant_at(pos) {
					out.insert(value);
				}
			}
		}
	}

	out
}

/// Returns the set of concrete class descriptors assigned into the argument register within the
/// enclosing method, via `new-instance`, `check-cast`, typed `move-object` chains and
/// `aput-object` stores into the register's array.
pub fn solved_typeset_in_invocation(store: &Store, site: &Op, index: usize) -> BTreeSet<String> {
	let mut out = BTreeSet::new();

	if let Ok(reg) = argument_register_of(site, index) {
		if let Ok(mut solver) = Solver::for_site(store, site) {
			solver.collect_types(&reg, &mut out, 0);
		}
	}

	out
}

/// Splits a register or multiregister operand into individual register names, expanding the
/// `{v0 .. v5}` range form.
pub fn decoded_registers_of(op: &Op) -> Result<Vec<String>, NoSuchValueError> {
	match op.k {
		TokenKind::Reg => Ok(vec![op.v.clone()]),
		TokenKind::MultiReg => {
			let v = op.v.trim();

			if let Some((from, to)) = v.split_once(" .. ") {
				let (prefix, first) = from.split_at(1);
				let last = &to[1..];
				let (first, last) = match (first.parse::<u32>(), last.parse::<u32>()) {
					(Ok(first), Ok(last)) if first <= last => (first, last),
					_ => return Err(NoSuchValueError),
				};

				Ok((first..=last).map(|n| format!("{prefix}{n}")).collect())
			} else {
				Ok(v.split(',').map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).collect())
			}
		}
		_ => Err(NoSuchValueError),
	}
}

/// Maps an argument index onto the register it occupies at the invocation. The receiver register
/// of non-static invokes is skipped.
fn argument_register_of(site: &Op, index: usize) -> Result<String, NoSuchValueError> {
	let operand = site.p.first().ok_or(NoSuchValueError)?;
	let regs = decoded_registers_of(operand)?;
	let skip = if site.v.ends_with("-static") { 0 } else { 1 };

	regs.get(index + skip).cloned().ok_or(NoSuchValueError)
}

// Instructions whose first operand register receives a value.
const VALUE_WRITERS: &[&str] =
	&["const", "new-instance", "new-array", "move", "array-length", "aget-", "sget-", "iget-"];

fn writes_value(op: &Op, reg: &str) -> bool {
	if op.k != TokenKind::Id || !VALUE_WRITERS.iter().any(|w| op.v.starts_with(w)) {
		return false;
	}

	matches!(op.p.first(), Some(p) if p.k == TokenKind::Reg && p.v == reg)
}

/// One backward reachability cone: the head ops of the enclosing method, plus the enclosing class
/// loaded on demand for field-initializer lookups.
struct Solver<'a> {
	store: &'a Store,
	anchor: OpId,
	ops: Vec<Op>,
	class_ops: Option<Vec<Op>>,
	visited: HashSet<OpId>,
}

impl<'a> Solver<'a> {
	fn for_site(store: &'a Store, site: &Op) -> Result<Solver<'a>, NoSuchValueError> {
		let q = store.query();
		let method = q.method_of(site).map_err(|_| NoSuchValueError)?.ok_or(NoSuchValueError)?;
		let ops = q.head_ops_in(method.first_op, method.last_op).map_err(|_| NoSuchValueError)?;

		Ok(Solver { store, anchor: site.id, ops, class_ops: None, visited: HashSet::new() })
	}

	fn position_of(&self, id: OpId) -> Result<usize, NoSuchValueError> {
		self.ops.binary_search_by_key(&id, |op| op.id).map_err(|_| NoSuchValueError)
	}

	/// The most recent writer of `reg` strictly before `pos`.
	fn recent_value_writer(&self, pos: usize, reg: &str) -> Result<usize, NoSuchValueError> {
		self.ops[..pos]
			.iter()
			.rposition(|op| writes_value(op, reg))
			.ok_or(NoSuchValueError)
	}

	fn resolve_constant_at(&mut self, pos: usize) -> Result<String, NoSuchValueError> {
		let op = self.ops[pos].clone();

		// Loop labels can route a move chain back over itself; remembering visited identifiers
		// bounds every query by the method length.
		if !self.visited.insert(op.id) {
			return Err(NoSuchValueError);
		}

		if op.v.starts_with("const") {
			return op.p.last().map(|p| p.v.clone()).ok_or(NoSuchValueError);
		}
		if op.v.starts_with("move-result") {
			// Produced by an invocation; not a constant.
			return Err(NoSuchValueError);
		}
		if op.v.starts_with("move") {
			let src = match op.p.get(1) {
				Some(p) if p.k == TokenKind::Reg => p.v.clone(),
				_ => return Err(NoSuchValueError),
			};
			let writer = self.recent_value_writer(pos, &src)?;

			return self.resolve_constant_at(writer);
		}
		if op.v.starts_with("sget") || op.v.starts_with("iget") {
			let field = op.target_value().to_string();

			return self.unique_field_initializer_constant(&field);
		}

		Err(NoSuchValueError)
	}

	/// Resolves a field load through the single `sput-*`/`iput-*` site of the field inside the
	/// enclosing class, when exactly one exists.
	fn unique_field_initializer_constant(&mut self, field: &str) -> Result<String, NoSuchValueError> {
		let class_ops = self.class_ops()?;
		let puts: Vec<usize> = class_ops
			.iter()
			.enumerate()
			.filter(|(_, op)| {
				op.k == TokenKind::Id
					&& (op.v.starts_with("sput") || op.v.starts_with("iput"))
					&& op.target_value() == field
			})
			.map(|(pos, _)| pos)
			.collect();

		if puts.len() != 1 {
			return Err(NoSuchValueError);
		}
		let put_pos = puts[0];

		let src = match class_ops[put_pos].p.first() {
			Some(p) if p.k == TokenKind::Reg => p.v.clone(),
			_ => return Err(NoSuchValueError),
		};

		for op in class_ops[..put_pos].iter().rev() {
			if writes_value(op, &src) {
				if op.v.starts_with("const") {
					return op.p.last().map(|p| p.v.clone()).ok_or(NoSuchValueError);
				}
				return Err(NoSuchValueError);
			}
		}

		Err(NoSuchValueError)
	}

	fn collect_types(&mut self, reg: &str, out: &mut BTreeSet<String>, depth: usize) {
		if depth > 16 {
			return;
		}

		let mut sources: Vec<String> = Vec::new();

		for op in &self.ops {
			if op.k != TokenKind::Id {
				continue;
			}

			let dest_is_reg = matches!(op.p.first(), Some(p) if p.k == TokenKind::Reg && p.v == reg);

			if (op.v.starts_with("new-instance") || op.v.starts_with("check-cast")) && dest_is_reg {
				out.insert(op.target_value().to_string());
			} else if op.v.starts_with("move-object") && !op.v.starts_with("move-result") && dest_is_reg {
				if let Some(src) = op.p.get(1).filter(|p| p.k == TokenKind::Reg) {
					sources.push(src.v.clone());
				}
			} else if op.v.starts_with("aput-object") {
				// A store into the array held by `reg` contributes the stored object's types.
				if matches!(op.p.get(1), Some(p) if p.k == TokenKind::Reg && p.v == reg) {
					if let Some(src) = op.p.first().filter(|p| p.k == TokenKind::Reg) {
						sources.push(src.v.clone());
					}
				}
			}
		}

		for src in sources {
			if src != reg {
				self.collect_types(&src, out, depth + 1);
			}
		}
	}

	fn class_ops(&mut self) -> Result<&[Op], NoSuchValueError> {
		if self.class_ops.is_none() {
			let q = self.store.query();
			let range = q.class_range_of(self.anchor).map_err(|_| NoSuchValueError)?.ok_or(NoSuchValueError)?;
			let ops = q.head_ops_in(range.0, range.1).map_err(|_| NoSuchValueError)?;

			self.class_ops = Some(ops);
		}

		Ok(self.class_ops.as_deref().unwrap())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn multireg(v: &str) -> Op {
		let mut op = Op::new(TokenKind::Id, "invoke-virtual");
		op.p = vec![Op::new(TokenKind::MultiReg, v)];
		op
	}

	#[test]
	fn decodes_register_lists() {
		let op = multireg("p0, v1, v2");
		assert_eq!(decoded_registers_of(&op.p[0]).unwrap(), vec!["p0", "v1", "v2"]);
	}

	#[test]
	fn decodes_register_ranges() {
		let op = multireg("v2 .. v5");
		assert_eq!(decoded_registers_of(&op.p[0]).unwrap(), vec!["v2", "v3", "v4", "v5"]);
	}

	#[test]
	fn rejects_non_register_operands() {
		let op = Op::new(TokenKind::RefLike, "Lfoo;");
		assert_eq!(decoded_registers_of(&op), Err(NoSuchValueError));
	}

	#[test]
	fn argument_indexing_skips_the_receiver_on_virtual_invokes() {
		let op = multireg("p0, v1, v2");
		assert_eq!(argument_register_of(&op, 0).unwrap(), "v1");
		assert_eq!(argument_register_of(&op, 1).unwrap(), "v2");

		let mut op = op;
		op.v = "invoke-static".to_string();
		assert_eq!(argument_register_of(&op, 0).unwrap(), "p0");
	}
}
