use std::collections::VecDeque;

use lazy_static::lazy_static;
use regex::Regex;

use crate::lexer::tokenize;
use crate::model::{Op, ParsedOp, TokenKind};

/// Parses a whole smali file into its operation stream.
///
/// The returned iterator is lazy, single-pass and finite; the indexer consumes it exactly once.
pub fn parse(text: &str) -> ParsedOps {
	lazy_static! {
		static ref NEWLINES: Regex = Regex::new(r"\n+").unwrap();
	}

	ParsedOps { queue: NEWLINES.split(text).map(|l| l.to_string()).collect() }
}

/// The lazy operation stream over one smali file.
///
/// Lines are held in a work queue so that annotation and parameter blocks can consume ahead of the
/// per-line cursor.
pub struct ParsedOps {
	queue: VecDeque<String>,
}

impl Iterator for ParsedOps {
	type Item = ParsedOp;

	fn next(&mut self) -> Option<ParsedOp> {
		while let Some(line) = self.queue.pop_front() {
			if line.is_empty() {
				continue;
			}

			let op = parse_line(&line);

			if op.is(TokenKind::Directive, "annotation") {
				return Some(ParsedOp::Annotation { head: op, content: self.block_until(".end annotation") });
			}
			if op.is(TokenKind::Directive, "param") && op.p.len() == 1 {
				return Some(ParsedOp::Param { head: op, content: self.block_until(".end param") });
			}
			// Old-style multi-parameter `.param` lines fall through as plain ops; they carry only
			// names and no block of their own.
			return Some(ParsedOp::Plain(op));
		}

		None
	}
}

impl ParsedOps {
	/// Collects raw lines into a block until `marker` appears at the front of the queue. The
	/// marker line itself is left queued and will come out as a plain op.
	fn block_until(&mut self, marker: &str) -> Vec<String> {
		let mut content = Vec::new();

		while let Some(front) = self.queue.front() {
			if front.contains(marker) {
				break;
			}
			content.push(self.queue.pop_front().unwrap());
		}

		content
	}
}

/// Parses one line: the first token becomes the head, the remaining tokens its parameters.
///
/// A line the lexer yields nothing for degrades to a single reflike op; parsing never fails.
fn parse_line(line: &str) -> Op {
	let mut tokens = tokenize(line);

	match tokens.next() {
		Some(mut head) => {
			head.p = tokens.collect();
			head
		}
		None => Op::new(TokenKind::RefLike, line),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	const FRAGMENT: &str = r#".class public Lcom/example/Foo;
.super Ljava/lang/Object;

.method public bar()V
    .registers 2

    .annotation system Ldalvik/annotation/Signature;
        value = {
            "()V"
        }
    .end annotation

    .param p1
    .end param

    const-string v0, "hello"
    return-void
.end method
"#;

	fn heads(text: &str) -> Vec<(TokenKind, String)> {
		parse(text).map(|p| (p.head().k, p.head().v.clone())).collect()
	}

	#[test]
	fn every_non_empty_line_yields_exactly_one_head() {
		let non_empty = FRAGMENT.lines().filter(|l| !l.is_empty()).count();

		// The three annotation content lines disappear into the block payload; the `.end` marker
		// lines remain ordinary ops of their own.
		assert_eq!(parse(FRAGMENT).count(), non_empty - 3);
	}

	#[test]
	fn folds_annotation_blocks() {
		let parsed: Vec<ParsedOp> = parse(FRAGMENT).collect();

		let annotation = parsed
			.iter()
			.find_map(|p| match p {
				ParsedOp::Annotation { head, content } => Some((head, content)),
				_ => None,
			})
			.unwrap();

		assert_eq!(annotation.0.v, "annotation");
		assert_eq!(annotation.1.len(), 3);
		assert!(annotation.1[1].contains("\"()V\""));
	}

	#[test]
	fn folds_single_parameter_param_blocks() {
		let parsed: Vec<ParsedOp> = parse(FRAGMENT).collect();

		let param = parsed
			.iter()
			.find_map(|p| match p {
				ParsedOp::Param { head, content } => Some((head, content)),
				_ => None,
			})
			.unwrap();

		assert_eq!(param.0.p.len(), 1);
		assert!(param.1.is_empty());
	}

	#[test]
	fn demotes_legacy_multi_parameter_param_lines() {
		let parsed: Vec<ParsedOp> = parse(".param p1, \"name\"\n.end method\n").collect();

		assert!(matches!(&parsed[0], ParsedOp::Plain(op) if op.v == "param" && op.p.len() == 2));
	}

	#[test]
	fn end_markers_stay_in_the_stream() {
		let kinds = heads(FRAGMENT);

		let ends = kinds.iter().filter(|(k, v)| *k == TokenKind::Directive && v == "end").count();
		assert_eq!(ends, 3); // .end annotation, .end param, .end method
	}

	#[test]
	fn unterminated_blocks_drain_the_queue() {
		let parsed: Vec<ParsedOp> = parse(".annotation runtime Lfoo;\n    value = 1").collect();

		assert_eq!(parsed.len(), 1);
		assert!(matches!(&parsed[0], ParsedOp::Annotation { content, .. } if content.len() == 1));
	}

	#[test]
	fn malformed_lines_degrade_to_reflike() {
		let parsed: Vec<ParsedOp> = parse("?? !!\n").collect();

		assert_eq!(parsed.len(), 1);
		assert_eq!(parsed[0].head().k, TokenKind::RefLike);

		// A line the lexer has nothing to say about still yields its one head op.
		let parsed: Vec<ParsedOp> = parse(", ,\n").collect();

		assert_eq!(parsed.len(), 1);
		assert_eq!(parsed[0].head(), &Op::new(TokenKind::RefLike, ", ,"));
	}
}
