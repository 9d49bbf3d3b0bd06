//! Tokenizer for the expression syntax.

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal.
    Number(f64),
    /// Quoted string literal, escapes resolved.
    Str(String),
    /// Identifier or keyword.
    Ident(String),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `:`
    Colon,
    /// `::`
    DoubleColon,
    /// `?`
    Question,
    /// `=`
    Assign,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `!`
    Bang,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
}

/// A token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Byte offset of its first character.
    pub offset: usize,
}

/// Error raised for characters that start no token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// What went wrong.
    pub message: String,
    /// Byte offset of the problem.
    pub offset: usize,
}

/// Splits `src` into tokens.
///
/// # Errors
///
/// Returns an error on unterminated strings, malformed numbers and
/// unexpected characters.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, LexError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let push = |tokens: &mut Vec<Spanned>, token| tokens.push(Spanned { token, offset });

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                // A dot followed by a non-digit ends the number (`x[0].id`).
                if chars[i].1 == '.' && !chars.get(i + 1).is_some_and(|(_, c)| c.is_ascii_digit()) {
                    break;
                }
                i += 1;
            }
            let end = chars.get(i).map_or(src.len(), |&(o, _)| o);
            let text = &src[chars[start].0..end];
            let n = text.parse::<f64>().map_err(|_| LexError {
                message: format!("invalid number {text:?}"),
                offset,
            })?;
            push(&mut tokens, Token::Number(n));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let end = chars.get(i).map_or(src.len(), |&(o, _)| o);
            push(&mut tokens, Token::Ident(src[chars[start].0..end].to_string()));
            continue;
        }

        if c == '"' {
            let (s, consumed) = lex_string(&chars[i + 1..]).ok_or_else(|| LexError {
                message: String::from("unterminated string literal"),
                offset,
            })?;
            push(&mut tokens, Token::Str(s));
            i += consumed + 1;
            continue;
        }

        let (token, width) = match (c, next) {
            (':', Some(':')) => (Token::DoubleColon, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            (':', _) => (Token::Colon, 1),
            ('?', _) => (Token::Question, 1),
            ('=', _) => (Token::Assign, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => {
                return Err(LexError {
                    message: format!("unexpected character {c:?}"),
                    offset,
                });
            }
        };
        push(&mut tokens, token);
        i += width;
    }

    Ok(tokens)
}

/// Reads a string body after the opening quote. Returns the unescaped text
/// and the number of characters consumed, including the closing quote.
fn lex_string(chars: &[(usize, char)]) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i].1 {
            '"' => return Some((out, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1)?.1;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src)
            .expect("tokenizes")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_traversal_with_index() {
        assert_eq!(
            kinds("a.b[0].c"),
            vec![
                Token::Ident(String::from("a")),
                Token::Dot,
                Token::Ident(String::from("b")),
                Token::LBracket,
                Token::Number(0.0),
                Token::RBracket,
                Token::Dot,
                Token::Ident(String::from("c")),
            ]
        );
    }

    #[test]
    fn test_operators_and_strings() {
        assert_eq!(
            kinds(r#"x >= 1.5 && "a\"b" != y"#),
            vec![
                Token::Ident(String::from("x")),
                Token::Ge,
                Token::Number(1.5),
                Token::And,
                Token::Str(String::from("a\"b")),
                Token::NotEq,
                Token::Ident(String::from("y")),
            ]
        );
        assert_eq!(kinds("provider::test::f")[1], Token::DoubleColon);
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("\"open").is_err());
        assert!(tokenize("a # b").is_err());
    }
}
