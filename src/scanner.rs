// ABOUTME: Scanner module converting Pascal source text into a token stream

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, one_of},
    combinator::{opt, recognize},
    multi::many0,
    sequence::pair,
    IResult, Parser,
};

use crate::error::InterpError;
use crate::token::{lookup_keyword, Token, TokenKind};

/// Scans Pascal source text into a flat token stream terminated by `Eof_`.
pub fn scan(src: &str) -> Result<Vec<Token>, InterpError> {
    let mut tokens = Vec::new();
    let mut remaining = src;
    let mut line = 1usize;
    let mut column = 1usize;

    loop {
        let (rest, l, c) = skip_trivia(remaining, line, column)?;
        remaining = rest;
        line = l;
        column = c;

        if remaining.is_empty() {
            tokens.push(Token::new(TokenKind::Eof_, "", line, column));
            break;
        }

        let start_line = line;
        let start_col = column;

        let (rest, token_kind, lexeme) = scan_one(remaining, line, column)?;
        let consumed = remaining.len() - rest.len();
        advance_position(&remaining[..consumed], &mut line, &mut column);
        remaining = rest;

        tokens.push(Token::new(token_kind, lexeme, start_line, start_col));
    }

    Ok(tokens)
}

/// Skip whitespace and the two non-nesting comment forms, tracking position.
fn skip_trivia(
    mut input: &str,
    mut line: usize,
    mut column: usize,
) -> Result<(&str, usize, usize), InterpError> {
    loop {
        let start_len = input.len();

        // whitespace
        let trimmed_len = input
            .char_indices()
            .find(|&(_, c)| !c.is_whitespace())
            .map(|(i, _)| i)
            .unwrap_or(input.len());
        if trimmed_len > 0 {
            advance_position(&input[..trimmed_len], &mut line, &mut column);
            input = &input[trimmed_len..];
        }

        if let Some(rest) = input.strip_prefix('{') {
            let (body_line, body_col) = (line, column);
            match rest.find('}') {
                Some(idx) => {
                    advance_position(&input[..idx + 2], &mut line, &mut column);
                    input = &rest[idx + 1..];
                }
                None => return Err(InterpError::lex("unterminated comment", body_line, body_col)),
            }
            continue;
        }

        if let Some(rest) = input.strip_prefix("(*") {
            let (body_line, body_col) = (line, column);
            match rest.find("*)") {
                Some(idx) => {
                    advance_position(&input[..idx + 4], &mut line, &mut column);
                    input = &rest[idx + 2..];
                }
                None => return Err(InterpError::lex("unterminated comment", body_line, body_col)),
            }
            continue;
        }

        if input.len() == start_len {
            break;
        }
    }
    Ok((input, line, column))
}

fn advance_position(consumed: &str, line: &mut usize, column: &mut usize) {
    for ch in consumed.chars() {
        if ch == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

fn scan_one(input: &str, line: usize, column: usize) -> Result<(&str, TokenKind, String), InterpError> {
    if let Ok((rest, lexeme)) = parse_string_literal(input) {
        let consumed = &input[..input.len() - rest.len()];
        let _ = consumed;
        return Ok((rest, TokenKind::StringLiteral(lexeme.clone()), lexeme));
    }
    if input.starts_with('\'') {
        return Err(InterpError::lex("unterminated string", line, column));
    }

    if let Ok((rest, text)) = parse_ident(input) {
        let lower = text.to_ascii_lowercase();
        let kind = lookup_keyword(&lower).unwrap_or(TokenKind::Identifier);
        return Ok((rest, kind, text.to_string()));
    }

    if let Ok((rest, text)) = parse_number(input) {
        let kind = if text.contains('.') || text.contains('e') || text.contains('E') {
            let v: f64 = text.parse().map_err(|_| {
                InterpError::lex(format!("malformed real literal '{}'", text), line, column)
            })?;
            TokenKind::RealLiteral(v)
        } else {
            let v: i64 = text.parse().map_err(|_| {
                InterpError::lex(format!("malformed integer literal '{}'", text), line, column)
            })?;
            TokenKind::IntLiteral(v)
        };
        return Ok((rest, kind, text.to_string()));
    }

    if let Ok((rest, kind_lexeme)) = parse_operator_or_punct(input) {
        let (kind, lexeme) = kind_lexeme;
        return Ok((rest, kind, lexeme));
    }

    let bad = input.chars().next().unwrap();
    Err(InterpError::lex(
        format!("unexpected character '{}'", bad),
        line,
        column,
    ))
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        one_of("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_"),
        many0(one_of(
            "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_",
        )),
    ))
    .parse(input)
}

/// Integer: digits. Real: digits '.' digits [eE [+-] digits].
fn parse_number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        digit1,
        opt(pair(
            pair(char('.'), digit1),
            opt(pair(one_of("eE"), pair(opt(one_of("+-")), digit1))),
        )),
    ))
    .parse(input)
}

/// Single-quoted string literal; `''` inside denotes one literal quote.
fn parse_string_literal(input: &str) -> IResult<&str, String> {
    let (mut input, _) = char('\'')(input)?;
    let mut result = String::new();
    loop {
        match input.chars().next() {
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Eof,
                )))
            }
            Some('\'') => {
                let rest = &input[1..];
                if let Some(stripped) = rest.strip_prefix('\'') {
                    result.push('\'');
                    input = stripped;
                } else {
                    return Ok((rest, result));
                }
            }
            Some(c) => {
                result.push(c);
                input = &input[c.len_utf8()..];
            }
        }
    }
}

fn parse_operator_or_punct(input: &str) -> IResult<&str, (TokenKind, String)> {
    use TokenKind::*;
    alt((
        alt((
            nom_tag(":=", Assign_),
            nom_tag("<>", NotEqual),
            nom_tag("<=", LessEqual),
            nom_tag(">=", GreaterEqual),
            nom_tag("..", DotDot),
        )),
        alt((
            nom_tag("+", Plus),
            nom_tag("-", Minus),
            nom_tag("*", Star),
            nom_tag("/", Slash),
            nom_tag("=", Equal),
            nom_tag("<", Less),
            nom_tag(">", Greater),
            nom_tag("(", LParen),
            nom_tag(")", RParen),
            nom_tag("[", LBracket),
            nom_tag("]", RBracket),
            nom_tag(",", Comma),
            nom_tag(";", Semicolon),
            nom_tag(":", Colon),
            nom_tag(".", Dot),
            nom_tag("^", Caret),
            nom_tag("@", At),
        )),
    ))
    .parse(input)
}

fn nom_tag<'a>(
    lit: &'static str,
    kind: TokenKind,
) -> impl FnMut(&'a str) -> IResult<&'a str, (TokenKind, String)> {
    move |input: &'a str| {
        let (rest, matched) = tag(lit)(input)?;
        Ok((rest, (kind.clone(), matched.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        scan(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_keywords_case_insensitively() {
        assert_eq!(kinds("PROGRAM"), vec![TokenKind::Program, TokenKind::Eof_]);
        assert_eq!(kinds("Program"), vec![TokenKind::Program, TokenKind::Eof_]);
        assert_eq!(kinds("program"), vec![TokenKind::Program, TokenKind::Eof_]);
    }

    #[test]
    fn scans_integer_and_real_literals() {
        assert_eq!(
            kinds("42 2.5"),
            vec![
                TokenKind::IntLiteral(42),
                TokenKind::RealLiteral(2.5),
                TokenKind::Eof_
            ]
        );
    }

    #[test]
    fn scans_string_with_doubled_quote() {
        let toks = scan("'it''s'").unwrap();
        assert_eq!(toks[0].kind, TokenKind::StringLiteral("it's".to_string()));
    }

    #[test]
    fn scans_compound_operators() {
        assert_eq!(
            kinds(":= <> <= >= .."),
            vec![
                TokenKind::Assign_,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::DotDot,
                TokenKind::Eof_,
            ]
        );
    }

    #[test]
    fn skips_both_comment_forms() {
        assert_eq!(
            kinds("{ comment } 1 (* another *) 2"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::IntLiteral(2),
                TokenKind::Eof_
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = scan("x\n  y").unwrap();
        assert_eq!((toks[0].line, toks[0].column), (1, 1));
        assert_eq!((toks[1].line, toks[1].column), (2, 3));
    }

    #[test]
    fn unterminated_string_is_lex_error() {
        assert!(scan("'abc").is_err());
    }

    #[test]
    fn unterminated_comment_is_lex_error() {
        assert!(scan("{ abc").is_err());
        assert!(scan("(* abc").is_err());
    }

    #[test]
    fn unknown_character_is_lex_error() {
        assert!(scan("$").is_err());
    }
}
