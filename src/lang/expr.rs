//! Expression syntax tree and parser.
//!
//! Expressions are written either as bare expression fields (`condition`,
//! `count`) or as string templates where `${ ... }` interpolates an
//! expression into surrounding text. A template that consists of exactly
//! one interpolation evaluates to the interpolated value itself, keeping
//! its type.

use super::lexer::{Spanned, Token, tokenize};
use super::traversal::Traversal;
use super::value::Value;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!x`
    Not,
    /// `-x`
    Negate,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

/// Name of a called function: a builtin, or `provider::<provider>::<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionName {
    /// Provider type for provider-defined functions.
    pub provider: Option<String>,
    /// Function name.
    pub name: String,
}

/// Literal text or an interpolated expression inside a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Text copied as-is.
    Literal(String),
    /// `${ expr }`
    Interpolation(Expr),
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A reference such as `var.x` or `test_resource.a[0].id`.
    Traversal(Traversal),
    /// `[a, b]`
    List(Vec<Self>),
    /// `{ key = value }`
    Object(Vec<(String, Self)>),
    /// Attribute access on a computed value.
    GetAttr {
        /// The object expression.
        object: Box<Self>,
        /// Attribute name.
        name: String,
    },
    /// Index access with a computed key.
    Index {
        /// The collection expression.
        collection: Box<Self>,
        /// The key expression.
        key: Box<Self>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Self>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Self>,
        /// Right operand.
        rhs: Box<Self>,
    },
    /// `condition ? then : otherwise`
    Conditional {
        /// The condition.
        condition: Box<Self>,
        /// Value when true.
        then: Box<Self>,
        /// Value when false.
        otherwise: Box<Self>,
    },
    /// Function call.
    Call {
        /// Called function.
        function: FunctionName,
        /// Arguments.
        args: Vec<Self>,
    },
    /// String template with at least one interpolation.
    Template(Vec<TemplatePart>),
}

/// A syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset in the source.
    pub offset: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl Expr {
    /// Shorthand for a string literal.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::Literal(Value::String(s.into()))
    }

    /// Collects every traversal in the expression, in source order.
    #[must_use]
    pub fn traversals(&self) -> Vec<&Traversal> {
        let mut out = Vec::new();
        self.collect_traversals(&mut out);
        out
    }

    fn collect_traversals<'a>(&'a self, out: &mut Vec<&'a Traversal>) {
        match self {
            Self::Literal(_) => {}
            Self::Traversal(t) => out.push(t),
            Self::List(items) => items.iter().for_each(|e| e.collect_traversals(out)),
            Self::Object(attrs) => attrs.iter().for_each(|(_, e)| e.collect_traversals(out)),
            Self::GetAttr { object, .. } => object.collect_traversals(out),
            Self::Index { collection, key } => {
                collection.collect_traversals(out);
                key.collect_traversals(out);
            }
            Self::Unary { operand, .. } => operand.collect_traversals(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_traversals(out);
                rhs.collect_traversals(out);
            }
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_traversals(out);
                then.collect_traversals(out);
                otherwise.collect_traversals(out);
            }
            Self::Call { args, .. } => args.iter().for_each(|e| e.collect_traversals(out)),
            Self::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(e) = part {
                        e.collect_traversals(out);
                    }
                }
            }
        }
    }

    /// Collects every provider function called anywhere in the expression.
    #[must_use]
    pub fn provider_functions(&self) -> Vec<&FunctionName> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Self::Call { function, .. } = e
                && function.provider.is_some()
            {
                out.push(function);
            }
        });
        out
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Self)) {
        f(self);
        match self {
            Self::Literal(_) | Self::Traversal(_) => {}
            Self::List(items) | Self::Call { args: items, .. } => items.iter().for_each(|e| e.visit(f)),
            Self::Object(attrs) => attrs.iter().for_each(|(_, e)| e.visit(f)),
            Self::GetAttr { object, .. } => object.visit(f),
            Self::Unary { operand, .. } => operand.visit(f),
            Self::Index {
                collection: lhs,
                key: rhs,
            }
            | Self::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
            Self::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(e) = part {
                        e.visit(f);
                    }
                }
            }
        }
    }
}

/// Parses a bare expression.
///
/// # Errors
///
/// Returns an error when `src` is not a single well-formed expression.
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src).map_err(|e| ParseError {
        message: e.message,
        offset: e.offset,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
    };
    let expr = parser.expression()?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(ParseError {
            message: format!("unexpected {:?} after expression", extra.token),
            offset: extra.offset,
        });
    }
    Ok(expr)
}

/// Parses a string template.
///
/// `$${` produces a literal `${`. Text without interpolations becomes a
/// string literal.
///
/// # Errors
///
/// Returns an error on an unclosed interpolation or an invalid expression
/// inside one.
pub fn parse_template(src: &str) -> Result<Expr, ParseError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = src;
    let mut base = 0;

    while let Some(start) = rest.find("${") {
        if rest[..start].ends_with('$') {
            literal.push_str(&rest[..start - 1]);
            literal.push_str("${");
            rest = &rest[start + 2..];
            base += start + 2;
            continue;
        }
        literal.push_str(&rest[..start]);
        let body_start = start + 2;
        let len = interpolation_len(&rest[body_start..]).ok_or_else(|| ParseError {
            message: String::from("unclosed template interpolation"),
            offset: base + start,
        })?;
        let body = &rest[body_start..body_start + len];
        let expr = parse_expression(body).map_err(|e| ParseError {
            message: e.message,
            offset: base + body_start + e.offset,
        })?;
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(TemplatePart::Interpolation(expr));
        let consumed = body_start + len + 1;
        rest = &rest[consumed..];
        base += consumed;
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    match parts.as_slice() {
        [] => Ok(Expr::string("")),
        [TemplatePart::Literal(s)] => Ok(Expr::string(s.clone())),
        [TemplatePart::Interpolation(e)] => Ok(e.clone()),
        _ => Ok(Expr::Template(parts)),
    }
}

/// Length of an interpolation body up to (not including) its closing brace.
fn interpolation_len(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.peek_spanned().map_or(self.end, |s| s.offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            offset: self.offset(),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let condition = self.binary(0)?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect(&Token::Colon, "\":\" in conditional expression")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        while let Some((op, prec)) = self.peek().and_then(binary_op) {
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 => {
                        // Legacy `list.0` index form.
                        expr = index(expr, Expr::Literal(Value::Number(n)));
                        continue;
                    }
                    _ => return Err(self.error(String::from("expected attribute name after \".\""))),
                };
                expr = match expr {
                    Expr::Traversal(t) => Expr::Traversal(t.attr(name)),
                    other => Expr::GetAttr {
                        object: Box::new(other),
                        name,
                    },
                };
            } else if self.eat(&Token::LBracket) {
                let key = self.expression()?;
                self.expect(&Token::RBracket, "\"]\"")?;
                expr = index(expr, key);
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::string(s)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(&Token::RParen, "\")\"")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let items = self.sequence(&Token::RBracket, Self::expression)?;
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let attrs = self.sequence(&Token::RBrace, Self::object_item)?;
                Ok(Expr::Object(attrs))
            }
            Some(Token::Ident(name)) => self.named(name),
            Some(other) => Err(ParseError {
                message: format!("unexpected {other:?}"),
                offset,
            }),
            None => Err(ParseError {
                message: String::from("unexpected end of expression"),
                offset,
            }),
        }
    }

    fn named(&mut self, name: String) -> Result<Expr, ParseError> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }

        if name == "provider" && self.peek() == Some(&Token::DoubleColon) {
            self.pos += 1;
            let provider = self.ident("provider name")?;
            self.expect(&Token::DoubleColon, "\"::\" after provider name")?;
            let func = self.ident("function name")?;
            self.expect(&Token::LParen, "\"(\" after function name")?;
            let args = self.sequence(&Token::RParen, Self::expression)?;
            return Ok(Expr::Call {
                function: FunctionName {
                    provider: Some(provider),
                    name: func,
                },
                args,
            });
        }

        if self.eat(&Token::LParen) {
            let args = self.sequence(&Token::RParen, Self::expression)?;
            return Ok(Expr::Call {
                function: FunctionName { provider: None, name },
                args,
            });
        }

        Ok(Expr::Traversal(Traversal::root(name)))
    }

    fn object_item(&mut self) -> Result<(String, Expr), ParseError> {
        let key = match self.advance() {
            Some(Token::Ident(k) | Token::Str(k)) => k,
            _ => return Err(self.error(String::from("expected object key"))),
        };
        if !(self.eat(&Token::Assign) || self.eat(&Token::Colon)) {
            return Err(self.error(String::from("expected \"=\" or \":\" after object key")));
        }
        Ok((key, self.expression()?))
    }

    /// Parses comma-separated items up to `close`, allowing a trailing comma.
    fn sequence<T>(
        &mut self,
        close: &Token,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(item(self)?);
            if !self.eat(&Token::Comma) {
                self.expect(close, &format!("{close:?} or \",\""))?;
                return Ok(items);
            }
        }
    }
}

/// Builds an index expression, folding literal keys into traversals.
fn index(collection: Expr, key: Expr) -> Expr {
    match (collection, key) {
        (Expr::Traversal(t), Expr::Literal(k @ (Value::Number(_) | Value::String(_)))) => Expr::Traversal(t.index(k)),
        (collection, key) => Expr::Index {
            collection: Box::new(collection),
            key: Box::new(key),
        },
    }
}

const fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::Or => (BinaryOp::Or, 1),
        Token::And => (BinaryOp::And, 2),
        Token::EqEq => (BinaryOp::Equal, 3),
        Token::NotEq => (BinaryOp::NotEqual, 3),
        Token::Lt => (BinaryOp::Less, 4),
        Token::Le => (BinaryOp::LessEqual, 4),
        Token::Gt => (BinaryOp::Greater, 4),
        Token::Ge => (BinaryOp::GreaterEqual, 4),
        Token::Plus => (BinaryOp::Add, 5),
        Token::Minus => (BinaryOp::Subtract, 5),
        Token::Star => (BinaryOp::Multiply, 6),
        Token::Slash => (BinaryOp::Divide, 6),
        Token::Percent => (BinaryOp::Modulo, 6),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 > 6 && !false").expect("parses");
        let Expr::Binary { op, lhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::And);
        let Expr::Binary { op, lhs, .. } = *lhs else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::Greater);
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_traversal_folds_literal_index() {
        let expr = parse_expression("test_resource.web[0].id").expect("parses");
        assert_eq!(
            expr,
            Expr::Traversal(
                Traversal::root("test_resource")
                    .attr("web")
                    .index(Value::Number(0.0))
                    .attr("id")
            )
        );
    }

    #[test]
    fn test_dynamic_index_keeps_both_traversals() {
        let expr = parse_expression("var.names[count.index]").expect("parses");
        let names: Vec<String> = expr.traversals().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["var.names", "count.index"]);
    }

    #[test]
    fn test_conditional_and_calls() {
        let expr = parse_expression("var.on ? upper(\"x\") : provider::test::is_true(local.y)").expect("parses");
        assert!(matches!(expr, Expr::Conditional { .. }));
        let functions = expr.provider_functions();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].provider.as_deref(), Some("test"));
    }

    #[test]
    fn test_collections() {
        let expr = parse_expression("{ a = [1, 2,], \"b\": null }").expect("parses");
        let Expr::Object(attrs) = expr else {
            panic!("expected object");
        };
        assert_eq!(attrs.len(), 2);
        assert!(matches!(&attrs[0].1, Expr::List(items) if items.len() == 2));
    }

    #[test]
    fn test_template_forms() {
        assert_eq!(parse_template("plain").expect("parses"), Expr::string("plain"));
        assert_eq!(
            parse_template("${var.x}").expect("parses"),
            Expr::Traversal(Traversal::root("var").attr("x"))
        );
        assert_eq!(parse_template("$${literal}").expect("parses"), Expr::string("${literal}"));

        let expr = parse_template("web-${var.env}-${ { a = 1 }.a }").expect("parses");
        let Expr::Template(parts) = expr else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 4);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_template("${var.x").is_err());
        assert!(parse_expression("provider::test(1)").is_err());
    }
}
