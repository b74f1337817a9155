//! Grammar backend: tolerant lexing and parsing of expanded COBOL source.
//!
//! This module sits behind the narrow `tokenize`/`parse` seam the frontend
//! drives. The frontend and everything above it stay correct if this
//! backend is swapped for a generated parser with equivalent semantics: the
//! contract is an [`AstNode`] tree plus a diagnostic stream, nothing more.
//!
//! Parsing is line-structured and never aborts. Recovery from an
//! unclassifiable region skips to the next period, in the manner of COBOL
//! compilers resynchronizing on sentence boundaries.

use coqu_lang_core::{Diagnostic, SrcPos, TextSpan};

use crate::index::{DivisionName, ExecKind};
use crate::parse::ast::{AstNode, NodeKind};

/// Token classes produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Number,
    Literal,
    Period,
    Other,
}

/// A lexed token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SrcPos,
}

/// Tokenize one line of source.
pub fn tokenize(line: &str, line_no: u32) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let column = i as u32 + 1;

        if c == '\'' || c == '"' {
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            tokens.push(Token {
                kind: TokenKind::Literal,
                text: chars[start..i].iter().collect(),
                pos: SrcPos::new(line_no, column),
            });
            continue;
        }

        if c == '.' {
            // A period is a terminator only when not glued into a number.
            let next = chars.get(i + 1);
            if next.is_none_or(|n| n.is_whitespace()) {
                tokens.push(Token {
                    kind: TokenKind::Period,
                    text: ".".into(),
                    pos: SrcPos::new(line_no, column),
                });
                i += 1;
                continue;
            }
        }

        if c.is_ascii_alphanumeric() || c == '-' || c == ':' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric()
                    || chars[i] == '-'
                    || chars[i] == ':'
                    || (chars[i] == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())))
            {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let kind = if text.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
                TokenKind::Number
            } else {
                TokenKind::Word
            };
            tokens.push(Token {
                kind,
                text,
                pos: SrcPos::new(line_no, column),
            });
            continue;
        }

        tokens.push(Token {
            kind: TokenKind::Other,
            text: c.to_string(),
            pos: SrcPos::new(line_no, column),
        });
        i += 1;
    }

    tokens
}

/// Statement verbs the parser opens statement nodes on.
const VERBS: [&str; 34] = [
    "EXEC",
    "MOVE",
    "PERFORM",
    "CALL",
    "IF",
    "ELSE",
    "EVALUATE",
    "WHEN",
    "READ",
    "WRITE",
    "REWRITE",
    "DELETE",
    "START",
    "OPEN",
    "CLOSE",
    "DISPLAY",
    "ACCEPT",
    "COMPUTE",
    "ADD",
    "SUBTRACT",
    "MULTIPLY",
    "DIVIDE",
    "STRING",
    "UNSTRING",
    "INSPECT",
    "INITIALIZE",
    "SET",
    "GO",
    "STOP",
    "EXIT",
    "CONTINUE",
    "SEARCH",
    "SORT",
    "GOBACK",
];

struct ParseCtx {
    diagnostics: Vec<Diagnostic>,
    /// Lines consumed by error recovery; no further reporting for these.
    recovering: bool,
}

/// Parse expanded source lines into a program tree.
///
/// `first_line` is the original line number of `lines[0]`; spans are
/// emitted relative to it so segment parses keep real line numbers.
pub fn parse(lines: &[String], first_line: u32) -> (AstNode, Vec<Diagnostic>) {
    let mut ctx = ParseCtx {
        diagnostics: Vec::new(),
        recovering: false,
    };

    let last_line = first_line + lines.len().saturating_sub(1) as u32;
    let mut program = AstNode::leaf(
        NodeKind::Program,
        TextSpan::new(SrcPos::new(first_line, 1), SrcPos::new(last_line, 1)),
    );

    let mut division: Option<AstNode> = None;
    let mut section: Option<AstNode> = None;
    let mut paragraph: Option<AstNode> = None;
    let mut statement: Option<(AstNode, Vec<String>)> = None;
    let mut exec: Option<(ExecKind, u32, Vec<String>)> = None;

    macro_rules! close_statement {
        ($into:expr, $end_line:expr) => {
            if let Some((mut node, parts)) = statement.take() {
                node.span.end = SrcPos::new($end_line, 1);
                node.text = Some(parts.join(" "));
                $into.children.push(node);
            }
        };
    }

    for (i, raw) in lines.iter().enumerate() {
        let line_no = first_line + i as u32;

        if is_comment(raw) {
            // EXEC sentinel comments delimit opaque embedded blocks.
            if let Some(kind) = sentinel_begin(raw) {
                exec = Some((kind, line_no, Vec::new()));
            } else if raw.trim_start().starts_with("*>EXEC-END") {
                if let Some((kind, start, body)) = exec.take() {
                    let node = AstNode::leaf(
                        NodeKind::ExecBlock { exec: kind },
                        TextSpan::new(SrcPos::new(start, 1), SrcPos::new(line_no, 1)),
                    )
                    .with_text(body.join("\n"));
                    attach(&mut program, &mut division, &mut section, &mut paragraph, node);
                }
            } else if let Some(name) = copy_placeholder_name(raw) {
                let node = AstNode::leaf(
                    NodeKind::CopyPlaceholder { name },
                    TextSpan::new(SrcPos::new(line_no, 1), SrcPos::new(line_no, 1)),
                );
                attach(&mut program, &mut division, &mut section, &mut paragraph, node);
            }
            continue;
        }

        if let Some((_, _, body)) = exec.as_mut() {
            body.push(raw.clone());
            continue;
        }

        let tokens = tokenize(raw, line_no);
        if tokens.is_empty() {
            continue;
        }

        // Division header.
        if let Some(name) = match_division(&tokens) {
            close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), line_no.saturating_sub(1));
            flush(&mut program, &mut division, &mut section, &mut paragraph);
            division = Some(AstNode::leaf(
                NodeKind::Division { name },
                TextSpan::new(tokens[0].pos, SrcPos::new(line_no, 1)),
            ));
            ctx.recovering = false;
            continue;
        }

        // Section header.
        if let Some(name) = match_section(&tokens) {
            close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), line_no.saturating_sub(1));
            flush_below_division(&mut division, &mut section, &mut paragraph);
            section = Some(AstNode::leaf(
                NodeKind::Section { name },
                TextSpan::new(tokens[0].pos, SrcPos::new(line_no, 1)),
            ));
            ctx.recovering = false;
            continue;
        }

        let in_procedure = matches!(
            division.as_ref().map(|d| &d.kind),
            Some(NodeKind::Division {
                name: DivisionName::Procedure
            })
        );

        if in_procedure {
            // Paragraph header: WORD PERIOD at end of line, starting in
            // Area A. A lone `END-READ.` in Area B is statement text.
            if tokens.len() == 2
                && tokens[0].kind == TokenKind::Word
                && tokens[0].pos.column <= 11
                && tokens[1].kind == TokenKind::Period
                && !VERBS.contains(&tokens[0].text.to_ascii_uppercase().as_str())
            {
                close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), line_no.saturating_sub(1));
                flush_paragraph(&mut division, &mut section, &mut paragraph);
                paragraph = Some(AstNode::leaf(
                    NodeKind::Paragraph {
                        name: tokens[0].text.to_ascii_uppercase(),
                    },
                    TextSpan::new(tokens[0].pos, SrcPos::new(line_no, 1)),
                ));
                ctx.recovering = false;
                continue;
            }

            let first = tokens[0].text.to_ascii_uppercase();
            if VERBS.contains(&first.as_str()) {
                close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), line_no.saturating_sub(1));
                statement = Some((
                    AstNode::leaf(
                        NodeKind::Statement { verb: first },
                        TextSpan::new(tokens[0].pos, SrcPos::new(line_no, 1)),
                    ),
                    vec![raw.trim().to_string()],
                ));
                ctx.recovering = tokens.last().map(|t| t.kind) != Some(TokenKind::Period);
                if !ctx.recovering {
                    close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), line_no);
                }
                continue;
            }

            if let Some((_, parts)) = statement.as_mut() {
                // Continuation of an open statement.
                parts.push(raw.trim().to_string());
                if tokens.last().map(|t| t.kind) == Some(TokenKind::Period) {
                    close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), line_no);
                    ctx.recovering = false;
                }
                continue;
            }

            if !ctx.recovering {
                ctx.diagnostics.push(
                    Diagnostic::error("parse", format!("unexpected token '{}'", tokens[0].text))
                        .at(tokens[0].pos)
                        .with_tokens(
                            vec!["statement verb".into(), "paragraph header".into()],
                            tokens[0].text.clone(),
                        ),
                );
                ctx.recovering = true;
            }
            if tokens.last().map(|t| t.kind) == Some(TokenKind::Period) {
                ctx.recovering = false;
            }
            continue;
        }

        // Data description entry.
        let in_data = matches!(
            division.as_ref().map(|d| &d.kind),
            Some(NodeKind::Division {
                name: DivisionName::Data
            })
        );
        if in_data {
            if let Some((level, name)) = match_data_entry(&tokens) {
                let node = AstNode::leaf(
                    NodeKind::DataDescription { level, name },
                    TextSpan::new(tokens[0].pos, SrcPos::new(line_no, 1)),
                )
                .with_text(raw.trim().to_string());
                attach(&mut program, &mut division, &mut section, &mut paragraph, node);
            }
            continue;
        }
    }

    let total = first_line + lines.len() as u32;
    close_statement!(flush_target(&mut program, &mut division, &mut section, &mut paragraph), total.saturating_sub(1));
    flush(&mut program, &mut division, &mut section, &mut paragraph);

    (program, ctx.diagnostics)
}

fn is_comment(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() > 6 && (bytes[6] == b'*' || bytes[6] == b'/') {
        return true;
    }
    let leading = line.len() - line.trim_start().len();
    leading < 7 && line.trim_start().starts_with('*')
}

fn sentinel_begin(line: &str) -> Option<ExecKind> {
    let rest = line.trim_start().strip_prefix("*>EXEC-BEGIN")?;
    match rest.trim() {
        "SQL" => Some(ExecKind::Sql),
        "CICS" => Some(ExecKind::Cics),
        "DLI" => Some(ExecKind::Dli),
        _ => None,
    }
}

fn copy_placeholder_name(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix("*> COPY ")?;
    let name = rest.split_whitespace().next()?;
    rest.contains("(unresolved)")
        .then(|| name.to_ascii_uppercase())
}

fn match_division(tokens: &[Token]) -> Option<DivisionName> {
    if tokens.len() >= 2
        && tokens[1].kind == TokenKind::Word
        && tokens[1].text.eq_ignore_ascii_case("DIVISION")
    {
        return DivisionName::parse(&tokens[0].text);
    }
    None
}

fn match_section(tokens: &[Token]) -> Option<String> {
    if tokens.len() >= 3
        && tokens[0].kind == TokenKind::Word
        && tokens[1].text.eq_ignore_ascii_case("SECTION")
        && tokens.last().map(|t| t.kind) == Some(TokenKind::Period)
    {
        return Some(tokens[0].text.to_ascii_uppercase());
    }
    None
}

fn match_data_entry(tokens: &[Token]) -> Option<(u8, String)> {
    if tokens.len() >= 2 && tokens[0].kind == TokenKind::Number {
        let level: u8 = tokens[0].text.parse().ok()?;
        if (1..=49).contains(&level) || level == 66 || level == 77 || level == 88 {
            if tokens[1].kind == TokenKind::Word {
                return Some((level, tokens[1].text.to_ascii_uppercase()));
            }
        }
    }
    None
}

/// The node new children should attach to, innermost open scope first.
fn flush_target<'a>(
    program: &'a mut AstNode,
    division: &'a mut Option<AstNode>,
    section: &'a mut Option<AstNode>,
    paragraph: &'a mut Option<AstNode>,
) -> &'a mut AstNode {
    if let Some(p) = paragraph.as_mut() {
        return p;
    }
    if let Some(s) = section.as_mut() {
        return s;
    }
    if let Some(d) = division.as_mut() {
        return d;
    }
    program
}

fn attach(
    program: &mut AstNode,
    division: &mut Option<AstNode>,
    section: &mut Option<AstNode>,
    paragraph: &mut Option<AstNode>,
    node: AstNode,
) {
    flush_target(program, division, section, paragraph)
        .children
        .push(node);
}

fn flush_paragraph(
    division: &mut Option<AstNode>,
    section: &mut Option<AstNode>,
    paragraph: &mut Option<AstNode>,
) {
    if let Some(mut p) = paragraph.take() {
        if let Some(last) = p.children.last() {
            p.span.end = last.span.end;
        }
        if let Some(s) = section.as_mut() {
            s.children.push(p);
        } else if let Some(d) = division.as_mut() {
            d.children.push(p);
        }
    }
}

fn flush_below_division(
    division: &mut Option<AstNode>,
    section: &mut Option<AstNode>,
    paragraph: &mut Option<AstNode>,
) {
    flush_paragraph(division, section, paragraph);
    if let Some(mut s) = section.take() {
        if let Some(last) = s.children.last() {
            s.span.end = last.span.end;
        }
        if let Some(d) = division.as_mut() {
            d.children.push(s);
        }
    }
}

fn flush(
    program: &mut AstNode,
    division: &mut Option<AstNode>,
    section: &mut Option<AstNode>,
    paragraph: &mut Option<AstNode>,
) {
    flush_below_division(division, section, paragraph);
    if let Some(mut d) = division.take() {
        if let Some(last) = d.children.last() {
            d.span.end = last.span.end;
        }
        program.children.push(d);
    }
}
