use std::fmt;

use regex::Regex;

/// Identifier of an op inside the fact store. Identifiers are dense positive integers assigned in
/// source order during indexing; `0` marks an op the indexer has not persisted.
pub type OpId = i64;

/// The closed set of token kinds a smali line can decompose into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKind {
	Directive,
	Id,
	Reg,
	MultiReg,
	String,
	Label,
	MultiLabel,
	Comment,
	RefLike,
}

impl TokenKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TokenKind::Directive => "directive",
			TokenKind::Id => "id",
			TokenKind::Reg => "reg",
			TokenKind::MultiReg => "multireg",
			TokenKind::String => "string",
			TokenKind::Label => "label",
			TokenKind::MultiLabel => "multilabel",
			TokenKind::Comment => "comment",
			TokenKind::RefLike => "reflike",
		}
	}

	/// Maps a stored kind name back to a [`TokenKind`]. Unknown names degrade to
	/// [`TokenKind::RefLike`], mirroring how the lexer treats anything it cannot classify.
	pub fn parse(name: &str) -> TokenKind {
		match name {
			"directive" => TokenKind::Directive,
			"id" => TokenKind::Id,
			"reg" => TokenKind::Reg,
			"multireg" => TokenKind::MultiReg,
			"string" => TokenKind::String,
			"label" => TokenKind::Label,
			"multilabel" => TokenKind::MultiLabel,
			"comment" => TokenKind::Comment,
			_ => TokenKind::RefLike,
		}
	}
}

impl fmt::Display for TokenKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One parsed operation: a token with the remaining tokens of its source line as parameters.
///
/// The head token of a line carries `idx == 0`; its parameters carry `idx` 1..n. Identifiers are
/// assigned by the indexer and stay `0` on freshly parsed ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
	pub k: TokenKind,
	pub v: String,
	pub p: Vec<Op>,
	pub id: OpId,
	pub idx: u32,
}

impl Op {
	pub fn new(k: TokenKind, v: impl Into<String>) -> Op {
		Op { k, v: v.into(), p: Vec::new(), id: 0, idx: 0 }
	}

	/// Returns `true` if the op carries the given kind and value.
	pub fn is(&self, k: TokenKind, v: &str) -> bool { self.k == k && self.v == v }

	/// Returns the value of the trailing parameter, or the empty string for a bare op.
	///
	/// On every line the queries pattern-match (invocations, constants), the interesting operand
	/// is the trailing token: the invocation target or the literal.
	pub fn target_value(&self) -> &str { self.p.last().map(|p| p.v.as_str()).unwrap_or("") }

	/// Renders the full source line the op was parsed from, head and parameters space-joined.
	pub fn line(&self) -> String {
		let mut out = self.to_string();
		for p in &self.p {
			out.push(' ');
			out.push_str(&p.to_string());
		}
		out
	}
}

impl fmt::Display for Op {
	/// Renders the single token back to its source form, restoring the sigils the lexer strips.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.k {
			TokenKind::Directive => write!(f, ".{}", self.v),
			TokenKind::Label => write!(f, ":{}", self.v),
			TokenKind::MultiLabel | TokenKind::MultiReg => write!(f, "{{{}}}", self.v),
			TokenKind::String => write!(f, "\"{}\"", self.v),
			TokenKind::Comment => write!(f, "#{}", self.v),
			_ => f.write_str(&self.v),
		}
	}
}

/// A parsed operation as emitted by the line parser, before indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOp {
	Plain(Op),
	/// An `.annotation` directive together with the raw lines of its block. The payload is kept
	/// opaque and never indexed.
	Annotation { head: Op, content: Vec<String> },
	/// A single-parameter `.param` directive together with the raw lines of its block.
	Param { head: Op, content: Vec<String> },
}

impl ParsedOp {
	pub fn head(&self) -> &Op {
		match self {
			ParsedOp::Plain(op) => op,
			ParsedOp::Annotation { head, .. } => head,
			ParsedOp::Param { head, .. } => head,
		}
	}
}

/// Locates ops by an opcode prefix plus a regular expression over the trailing parameter.
///
/// The prefix narrows the candidate set (an indexed `LIKE` scan) before the regex runs.
#[derive(Debug, Clone)]
pub struct InvocationPattern {
	pub insn: String,
	pub value: Regex,
}

impl InvocationPattern {
	pub fn new(insn: &str, value: &str) -> Result<InvocationPattern, regex::Error> {
		Ok(InvocationPattern { insn: insn.to_string(), value: Regex::new(value)? })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn renders_sigils_back() {
		assert_eq!(Op::new(TokenKind::Directive, "method").to_string(), ".method");
		assert_eq!(Op::new(TokenKind::Label, "cond_0").to_string(), ":cond_0");
		assert_eq!(Op::new(TokenKind::String, "hello").to_string(), "\"hello\"");
		assert_eq!(Op::new(TokenKind::MultiReg, "v0, v1").to_string(), "{v0, v1}");
		assert_eq!(Op::new(TokenKind::RefLike, "Lfoo;").to_string(), "Lfoo;");
	}

	#[test]
	fn line_joins_head_and_parameters() {
		let mut op = Op::new(TokenKind::Id, "const-string");
		op.p = vec![Op::new(TokenKind::Reg, "v0"), Op::new(TokenKind::String, "x")];

		assert_eq!(op.line(), "const-string v0 \"x\"");
		assert_eq!(op.target_value(), "x");
	}
}
