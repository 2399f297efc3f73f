//! Rule condition parser.
//!
//! Recursive descent parser for condition expressions such as
//! `latest['SMA_5'] > latest['SMA_25'] and previous['RSI_14'] < 70`.
//! Converts text to an [`Expr`] with error messages carrying the character
//! offset and the expected/found tokens.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or      := and (("or" | "||" | "|") and)*
//! and     := not (("and" | "&&" | "&") not)*
//! not     := ("not" | "!") not | compare
//! compare := sum (cmp_op sum)*          chains desugar to AND
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | primary
//! primary := number | "True" | "False" | field | "(" or ")"
//! field   := ("latest" | "previous") ("[" quoted "]" | "." ident)
//! ```

use crate::domain::error::ParseError;
use crate::domain::rule::{ArithOp, CmpOp, Expr, RowRef};

/// Deepest nesting of parentheses, `not` and unary minus accepted.
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!(
                "condition nested deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            position: self.pos,
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(|c| format!("'{}'", c))
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(format!("expected '{}', found {}", expected, self.found()))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keywords: &[&str]) -> bool {
        self.skip_whitespace();
        for keyword in keywords {
            if self.peek_keyword(keyword) {
                self.pos += keyword.len();
                return true;
            }
        }
        false
    }

    /// Consume `symbol` unless it is immediately followed by one of `unless`.
    fn consume_symbol(&mut self, symbol: &str, unless: &[char]) -> bool {
        self.skip_whitespace();
        let remaining = self.remaining();
        if !remaining.starts_with(symbol) {
            return false;
        }
        if remaining[symbol.len()..]
            .chars()
            .next()
            .is_some_and(|c| unless.contains(&c))
        {
            return false;
        }
        self.pos += symbol.len();
        true
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        if word.is_empty() {
            self.found()
        } else {
            format!("'{}'", word)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.parse_and()?];
        loop {
            if self.consume_keyword(&["or", "OR"])
                || self.consume_symbol("||", &[])
                || self.consume_symbol("|", &[])
            {
                items.push(self.parse_and()?);
            } else {
                break;
            }
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.parse_not()?];
        loop {
            if self.consume_keyword(&["and", "AND"])
                || self.consume_symbol("&&", &[])
                || self.consume_symbol("&", &[])
            {
                items.push(self.parse_not()?);
            } else {
                break;
            }
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword(&["not", "NOT"]) || self.consume_symbol("!", &['=']) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_cmp_op(&mut self) -> Option<CmpOp> {
        self.skip_whitespace();
        const OPS: [(&str, CmpOp); 6] = [
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ];
        for (text, op) in OPS {
            if self.remaining().starts_with(text) {
                self.pos += text.len();
                return Some(op);
            }
        }
        None
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_sum()?;
        let mut comparisons = Vec::new();
        let mut left = first.clone();

        while let Some(op) = self.parse_cmp_op() {
            let right = self.parse_sum()?;
            comparisons.push(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right.clone()),
            });
            left = right;
        }

        Ok(match comparisons.len() {
            0 => first,
            1 => comparisons.remove(0),
            _ => Expr::And(comparisons),
        })
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_product()?;
        loop {
            let op = if self.consume_symbol("+", &[]) {
                ArithOp::Add
            } else if self.consume_symbol("-", &[]) {
                ArithOp::Sub
            } else {
                break;
            };
            let right = self.parse_product()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.consume_symbol("*", &[]) {
                ArithOp::Mul
            } else if self.consume_symbol("/", &[]) {
                ArithOp::Div
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume_symbol("-", &[]) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => {
                return Err(
                    self.error(format!("expected quoted column name, found {}", self.found()))
                );
            }
        };
        let start = self.pos;
        self.advance();
        let body_start = self.pos;
        while let Some(ch) = self.advance() {
            if ch == quote {
                let name = &self.input[body_start..self.pos - ch.len_utf8()];
                if name.is_empty() {
                    return Err(ParseError {
                        message: "empty column name".to_string(),
                        position: start,
                    });
                }
                return Ok(name.to_string());
            }
        }
        Err(ParseError {
            message: "unterminated string".to_string(),
            position: start,
        })
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        if word.is_empty() {
            return Err(self.error(format!("expected column name, found {}", self.found())));
        }
        self.pos += word.len();
        Ok(word)
    }

    fn parse_field(&mut self, row: RowRef) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let name = match self.peek() {
            Some('[') => {
                self.advance();
                let name = self.parse_quoted()?;
                self.expect_char(']')?;
                name
            }
            Some('.') => {
                self.advance();
                self.parse_ident()?
            }
            _ => {
                return Err(self.error(format!(
                    "expected '[' or '.' after '{}', found {}",
                    row,
                    self.found()
                )));
            }
        };
        Ok(Expr::Field { row, name })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '.')
        {
            return Ok(Expr::Number(self.parse_number()?));
        }

        if self.peek() == Some('(') {
            self.advance();
            let inner = self.nested(Self::parse_or)?;
            self.expect_char(')')?;
            return Ok(inner);
        }

        if self.consume_keyword(&["True", "true"]) {
            return Ok(Expr::Bool(true));
        }
        if self.consume_keyword(&["False", "false"]) {
            return Ok(Expr::Bool(false));
        }
        if self.consume_keyword(&["latest"]) {
            return self.parse_field(RowRef::Latest);
        }
        if self.consume_keyword(&["previous"]) {
            return self.parse_field(RowRef::Previous);
        }

        Err(self.error(format!(
            "expected number, 'latest', 'previous' or '(', found {}",
            self.peek_word()
        )))
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after condition: '{}'",
                self.remaining()
            )));
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(row: RowRef, name: &str) -> Expr {
        Expr::Field {
            row,
            name: name.to_string(),
        }
    }

    #[test]
    fn parse_simple_comparison() {
        let expr = parse("latest['RSI_14'] < 30").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                op: CmpOp::Lt,
                left: Box::new(field(RowRef::Latest, "RSI_14")),
                right: Box::new(Expr::Number(30.0)),
            }
        );
    }

    #[test]
    fn parse_double_quotes_and_attribute_access() {
        let a = parse(r#"previous["SMA_5"] <= previous.SMA_25"#).unwrap();
        match a {
            Expr::Compare { op, left, right } => {
                assert_eq!(op, CmpOp::Le);
                assert_eq!(*left, field(RowRef::Previous, "SMA_5"));
                assert_eq!(*right, field(RowRef::Previous, "SMA_25"));
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("latest.A > 1 or latest.B > 2 and latest.C > 3").unwrap();
        match expr {
            Expr::Or(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[1], Expr::And(_)));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn symbolic_boolean_operators() {
        let expr = parse("(latest.A > 1) & (latest.B > 2) | !(latest.C != 3)").unwrap();
        match expr {
            Expr::Or(items) => {
                assert!(matches!(items[0], Expr::And(_)));
                assert!(matches!(items[1], Expr::Not(_)));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn chained_comparison_desugars_to_and() {
        let expr = parse("30 < latest['RSI_14'] <= 70").unwrap();
        match expr {
            Expr::And(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], Expr::Compare { op: CmpOp::Lt, .. }));
                assert!(matches!(items[1], Expr::Compare { op: CmpOp::Le, .. }));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse("latest.Close - latest.Open * 2 > -1.5").unwrap();
        match expr {
            Expr::Compare { left, right, .. } => {
                assert!(matches!(
                    *left,
                    Expr::Arith {
                        op: ArithOp::Sub,
                        ..
                    }
                ));
                assert_eq!(*right, Expr::Neg(Box::new(Expr::Number(1.5))));
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn keywords_need_word_boundary() {
        assert!(parse("latest.A > 1 andlatest.B > 2").is_err());
        assert!(parse("notlatest.A").is_err());
    }

    #[test]
    fn boolean_literals() {
        assert_eq!(parse("True").unwrap(), Expr::Bool(true));
        assert_eq!(
            parse("not false").unwrap(),
            Expr::Not(Box::new(Expr::Bool(false)))
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = parse("__import__('os')").unwrap_err();
        assert!(err.message.contains("'__import__'"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn function_calls_are_rejected() {
        assert!(parse("abs(latest.A) > 1").is_err());
    }

    #[test]
    fn unterminated_string() {
        let err = parse("latest['SMA_5 > 1").unwrap_err();
        assert_eq!(err.message, "unterminated string");
        assert_eq!(err.position, 7);
    }

    #[test]
    fn missing_bracket() {
        let err = parse("latest['SMA_5' > 1").unwrap_err();
        assert!(err.message.contains("expected ']'"));
    }

    #[test]
    fn trailing_input() {
        let err = parse("latest.A > 1 latest.B").unwrap_err();
        assert!(err.message.contains("unexpected input"));
        assert_eq!(err.position, 13);
    }

    #[test]
    fn dangling_operator() {
        let err = parse("latest['RSI_14'] <").unwrap_err();
        assert!(err.message.contains("end of input"));
    }

    #[test]
    fn empty_input() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn moderate_nesting_parses() {
        let input = format!("{}latest.A > 1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&input).is_ok());
        assert!(parse(&format!("{}True", "not ".repeat(20))).is_ok());
    }

    #[test]
    fn runaway_parentheses_fail_cleanly() {
        let input = format!("{}latest.A > 1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse(&input).unwrap_err();
        assert!(err.message.contains("nested deeper"), "{}", err.message);
        assert_eq!(err.position, MAX_DEPTH + 1);
    }

    #[test]
    fn runaway_not_and_minus_fail_cleanly() {
        let nots = format!("{}True", "not ".repeat(10_000));
        assert!(parse(&nots).unwrap_err().message.contains("nested deeper"));
        let bangs = format!("{}True", "!".repeat(10_000));
        assert!(parse(&bangs).is_err());
        let minus = format!("{}1 > 0", "-".repeat(10_000));
        assert!(parse(&minus).unwrap_err().message.contains("nested deeper"));
    }
}
