use logos::Logos;

use crate::model::{Op, TokenKind};

/// The token grammar of one smali line.
///
/// The alternatives are ordered by specificity: anything the earlier rules do not claim falls
/// through to [`Token::RefLike`] (type descriptors, class references, hex literals), which makes
/// the lexer total over any non-empty line. Bare commas and runs of blanks are discarded.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
pub enum Token {
	#[regex(r":[a-z0-9_-]+", payload, priority = 6)]
	Label(String),

	#[regex(r"\{\s*(:[a-z0-9_-]+( \.\. )?)+\s*\}", unbraced, priority = 6)]
	MultiLabel(String),

	#[regex(r"\.[a-z0-9_-]+", payload, priority = 6)]
	Directive(String),

	#[regex(r#""[^\n]*""#, unquoted, priority = 6)]
	Str(String),

	#[regex(r"#[^\n]*", payload, priority = 6)]
	Comment(String),

	#[regex(r"[vp][0-9]+", slice, priority = 6)]
	Register(String),

	#[regex(r"\{[vp0-9,. ]+\}", unbraced, priority = 6)]
	MultiRegister(String),

	#[regex(r"[a-z][a-z/-]*[a-z0-9/-]*", slice, priority = 4)]
	Identifier(String),

	#[regex(r"[^ \t,]+", slice, priority = 2)]
	RefLike(String),

	#[error]
	#[regex(r"[ \t]+", logos::skip)]
	#[token(",", logos::skip)]
	Error,
}

fn slice(lex: &mut logos::Lexer<Token>) -> String { lex.slice().to_string() }

fn payload(lex: &mut logos::Lexer<Token>) -> String { lex.slice()[1..].to_string() }

fn unbraced(lex: &mut logos::Lexer<Token>) -> String {
	let s = lex.slice();
	s[1..s.len() - 1].to_string()
}

fn unquoted(lex: &mut logos::Lexer<Token>) -> String {
	let s = lex.slice();
	s[1..s.len() - 1].to_string()
}

impl Token {
	fn into_op(self) -> Option<Op> {
		let (k, v) = match self {
			Token::Label(v) => (TokenKind::Label, v),
			Token::MultiLabel(v) => (TokenKind::MultiLabel, v),
			Token::Directive(v) => (TokenKind::Directive, v),
			Token::Str(v) => (TokenKind::String, v),
			Token::Comment(v) => (TokenKind::Comment, v),
			Token::Register(v) => (TokenKind::Reg, v),
			Token::MultiRegister(v) => (TokenKind::MultiReg, v),
			Token::Identifier(v) => (TokenKind::Id, v),
			Token::RefLike(v) => (TokenKind::RefLike, v),
			Token::Error => return None,
		};

		Some(Op::new(k, v))
	}
}

/// Tokenizes one line into bare ops (no parameters attached yet).
///
/// Input the grammar cannot classify still comes out as a reflike op carrying the raw slice.
pub fn tokenize(line: &str) -> impl Iterator<Item = Op> + '_ {
	Token::lexer(line)
		.spanned()
		.map(move |(token, span)| token.into_op().unwrap_or_else(|| Op::new(TokenKind::RefLike, &line[span])))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::TokenKind::*;
	use pretty_assertions::assert_eq;

	fn lex(line: &str) -> Vec<(TokenKind, std::string::String)> { tokenize(line).map(|op| (op.k, op.v)).collect() }

	#[test]
	fn lexes_an_invocation_line() {
		assert_eq!(
			lex("invoke-virtual {p0, v1, v2}, Landroid/content/Context;->openFileOutput(Ljava/lang/String;I)Ljava/io/FileOutputStream;"),
			vec![
				(Id, "invoke-virtual".to_string()),
				(MultiReg, "p0, v1, v2".to_string()),
				(RefLike, "Landroid/content/Context;->openFileOutput(Ljava/lang/String;I)Ljava/io/FileOutputStream;".to_string()),
			]
		);
	}

	#[test]
	fn lexes_constants_and_registers() {
		assert_eq!(
			lex("const/4 v2, 0x1"),
			vec![(Id, "const/4".to_string()), (Reg, "v2".to_string()), (RefLike, "0x1".to_string())]
		);
		assert_eq!(
			lex("const-string v0, \"https://x/?q=%s\""),
			vec![(Id, "const-string".to_string()), (Reg, "v0".to_string()), (String, "https://x/?q=%s".to_string())]
		);
	}

	#[test]
	fn lexes_directives_labels_and_comments() {
		assert_eq!(
			lex(".method protected onCreate(Landroid/os/Bundle;)V"),
			vec![
				(Directive, "method".to_string()),
				(Id, "protected".to_string()),
				(RefLike, "onCreate(Landroid/os/Bundle;)V".to_string()),
			]
		);
		assert_eq!(lex(".end method"), vec![(Directive, "end".to_string()), (Id, "method".to_string())]);
		assert_eq!(lex(":cond_0"), vec![(Label, "cond_0".to_string())]);
		assert_eq!(lex("# static fields"), vec![(Comment, " static fields".to_string())]);
	}

	#[test]
	fn lexes_register_ranges_and_label_groups() {
		assert_eq!(lex("{v0 .. v5}"), vec![(MultiReg, "v0 .. v5".to_string())]);
		assert_eq!(
			lex(".catch Ljava/lang/Exception; {:try_start_0 .. :try_end_0} :catch_0"),
			vec![
				(Directive, "catch".to_string()),
				(RefLike, "Ljava/lang/Exception;".to_string()),
				(MultiLabel, ":try_start_0 .. :try_end_0".to_string()),
				(Label, "catch_0".to_string()),
			]
		);
	}

	#[test]
	fn discards_bare_commas() {
		assert_eq!(lex("v0, v1"), vec![(Reg, "v0".to_string()), (Reg, "v1".to_string())]);
	}

	#[test]
	fn everything_else_is_reflike() {
		assert_eq!(
			lex("sget-object v0, Lcom/example/Foo;->BAR:[I"),
			vec![
				(Id, "sget-object".to_string()),
				(Reg, "v0".to_string()),
				(RefLike, "Lcom/example/Foo;->BAR:[I".to_string()),
			]
		);
	}

	#[test]
	fn rejoining_tokens_relexes_to_the_same_sequence() {
		let lines = [
			"invoke-virtual {p0, v1, v2}, Landroid/content/Context;->openFileOutput(Ljava/lang/String;I)Ljava/io/FileOutputStream;",
			".method protected onCreate(Landroid/os/Bundle;)V",
			"const-string v0, \"https://x/?q=%s\"",
			".catch Ljava/lang/Exception; {:try_start_0 .. :try_end_0} :catch_0",
			"const/16 v4, 0x2e",
		];

		for line in lines {
			let ops: Vec<Op> = tokenize(line).collect();
			let rejoined = ops.iter().map(|op| op.to_string()).collect::<Vec<_>>().join(" ");
			let relexed: Vec<Op> = tokenize(&rejoined).collect();

			assert_eq!(ops, relexed, "line: {line}");
		}
	}
}
