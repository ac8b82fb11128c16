use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, Token};
use std::ops::Range;

/// Precedence-climbing parser over a token vector
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    source_len: usize,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<(Token<'src>, Range<usize>)>, source_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            source_len,
        }
    }

    /// Parse one complete expression; leftover tokens are an error
    pub fn parse_complete(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_expression()?;

        if let Some((token, span)) = self.peek() {
            return Err(ParseError::trailing_tokens(span.start, token.to_string()));
        }

        Ok(expr)
    }

    /// Parse an expression with full operator precedence
    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_conditional()
    }

    /// Parse ternary (lowest precedence, right associative)
    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let test = self.parse_nullish()?;

        if !self.match_token(Token::Question) {
            return Ok(test);
        }

        let consequent = self.parse_expression()?;
        self.expect(Token::Colon, "':' in conditional expression")?;
        let alternate = self.parse_expression()?;

        Ok(Expr::conditional(test, consequent, alternate))
    }

    /// Parse nullish coalescing (??)
    fn parse_nullish(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_or()?;

        while self.match_token(Token::Nullish) {
            let right = self.parse_or()?;
            left = Expr::binary(BinaryOp::Nullish, left, right);
        }

        Ok(left)
    }

    /// Parse logical OR
    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;

        while self.match_token(Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }

        Ok(left)
    }

    /// Parse logical AND
    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;

        while self.match_token(Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }

        Ok(left)
    }

    /// Parse equality (== != === !==)
    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;

        while let Some(op) = self.match_equality_op() {
            let right = self.parse_relational()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse relational (< > <= >=)
    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;

        while let Some(op) = self.match_relational_op() {
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse additive (+ -)
    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        while let Some(op) = self.match_additive_op() {
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse multiplicative (* / %)
    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(op) = self.match_multiplicative_op() {
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse prefix operators (! - +)
    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let operator = match self.peek() {
            Some((Token::Bang, _)) => UnaryOp::Not,
            Some((Token::Minus, _)) => UnaryOp::Negate,
            Some((Token::Plus, _)) => UnaryOp::Plus,
            _ => return self.parse_member(),
        };
        self.advance();

        let operand = self.parse_unary()?;
        Ok(Expr::unary(operator, operand))
    }

    /// Parse member access and optional chains: a.b, a[b], a?.b, a?.[b]
    fn parse_member(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.match_token(Token::Dot) {
                let name = self.expect_property_name()?;
                expr = Expr::member(expr, Expr::literal(Literal::String(name)), false, false);
            } else if self.match_token(Token::QuestionDot) {
                if self.match_token(Token::LBracket) {
                    let property = self.parse_expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::member(expr, property, true, true);
                } else {
                    let name = self.expect_property_name()?;
                    expr = Expr::member(expr, Expr::literal(Literal::String(name)), false, true);
                }
            } else if self.match_token(Token::LBracket) {
                let property = self.parse_expression()?;
                self.expect(Token::RBracket, "']'")?;
                expr = Expr::member(expr, property, true, false);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse primary expression (literals, identifiers, parenthesized groups)
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let (token, span) = match self.peek() {
            Some((token, span)) => (*token, span.clone()),
            None => return Err(ParseError::unexpected_end(self.current_pos(), "an expression")),
        };

        let expr = match token {
            Token::Number(raw) => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| ParseError::invalid_syntax(span.start, format!("invalid number {}", raw)))?;
                Expr::literal(Literal::Number(value))
            }
            Token::Str(raw) => Expr::literal(Literal::String(unescape(raw))),
            Token::True => Expr::literal(Literal::Boolean(true)),
            Token::False => Expr::literal(Literal::Boolean(false)),
            Token::Null => Expr::literal(Literal::Null),
            Token::Undefined => Expr::literal(Literal::Undefined),
            Token::Ident(name) => Expr::identifier(name),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(inner);
            }
            other => {
                return Err(ParseError::unexpected_token(
                    span.start,
                    "an expression",
                    other.to_string(),
                ))
            }
        };

        self.advance();
        Ok(expr)
    }

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            (Token::EqualEqual, _) => BinaryOp::Equals,
            (Token::BangEqual, _) => BinaryOp::NotEquals,
            (Token::StrictEqual, _) => BinaryOp::StrictEquals,
            (Token::StrictNotEqual, _) => BinaryOp::StrictNotEquals,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn match_relational_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            (Token::Less, _) => BinaryOp::LessThan,
            (Token::LessEqual, _) => BinaryOp::LessThanOrEqual,
            (Token::Greater, _) => BinaryOp::GreaterThan,
            (Token::GreaterEqual, _) => BinaryOp::GreaterThanOrEqual,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            (Token::Plus, _) => BinaryOp::Add,
            (Token::Minus, _) => BinaryOp::Subtract,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            (Token::Star, _) => BinaryOp::Multiply,
            (Token::Slash, _) => BinaryOp::Divide,
            (Token::Percent, _) => BinaryOp::Remainder,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn expect_property_name(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some((token, span)) => match token.property_name() {
                Some(name) => {
                    let name = name.to_string();
                    self.advance();
                    Ok(name)
                }
                None => Err(ParseError::unexpected_token(
                    span.start,
                    "a property name",
                    token.to_string(),
                )),
            },
            None => Err(ParseError::unexpected_end(self.current_pos(), "a property name")),
        }
    }

    fn expect(&mut self, expected: Token<'src>, description: &str) -> ParseResult<()> {
        match self.peek() {
            Some((token, _)) if *token == expected => {
                self.advance();
                Ok(())
            }
            Some((token, span)) => Err(ParseError::unexpected_token(
                span.start,
                description,
                token.to_string(),
            )),
            None => Err(ParseError::unexpected_end(self.current_pos(), description)),
        }
    }

    fn match_token(&mut self, expected: Token<'src>) -> bool {
        match self.peek() {
            Some((token, _)) if *token == expected => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source_len)
    }
}

/// Strip the surrounding quotes and resolve backslash escapes
fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len().saturating_sub(1).max(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

/// Parse an already tokenized expression
pub fn parse_tokens<'src>(
    tokens: Vec<(Token<'src>, Range<usize>)>,
    source_len: usize,
) -> ParseResult<Expr> {
    Parser::new(tokens, source_len).parse_complete()
}

/// Tokenize and parse expression source
pub fn parse(source: &str) -> ParseResult<Expr> {
    let tokens = tokenize(source)?;
    parse_tokens(tokens, source.len())
}
