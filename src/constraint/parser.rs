//! Memoized recursive-descent parser for constraint rules.
//!
//! The grammar is small but locally ambiguous (a program may open with
//! an if-statement or a bare expression, and both paths re-read the
//! same operand prefix), so alternatives are tried in order with a
//! packrat memo table keyed by (rule, position). The table lives inside
//! a single `parse` call and is never shared.

use std::collections::HashMap;

use thiserror::Error;

use super::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
    Plus,
    Minus,
}

/// Path-function family. All take string-literal arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFnKind {
    Xpath,
    XpathValue,
    XpathAny,
    XpathAll,
    XpathMatchRegex,
    XpathKeyBased,
    XpathKeyRegexReplace,
    XpathValueKeyRegexReplace,
}

impl PathFnKind {
    pub fn name(self) -> &'static str {
        match self {
            PathFnKind::Xpath => "xpath",
            PathFnKind::XpathValue => "xpath_value",
            PathFnKind::XpathAny => "xpath_any",
            PathFnKind::XpathAll => "xpath_all",
            PathFnKind::XpathMatchRegex => "xpath_match_regex",
            PathFnKind::XpathKeyBased => "xpath_key_based",
            PathFnKind::XpathKeyRegexReplace => "xpath_key_regex_replace",
            PathFnKind::XpathValueKeyRegexReplace => "xpath_value_key_regex_replace",
        }
    }

    fn arity(self) -> usize {
        match self {
            PathFnKind::Xpath
            | PathFnKind::XpathValue
            | PathFnKind::XpathAny
            | PathFnKind::XpathAll => 1,
            PathFnKind::XpathKeyBased
            | PathFnKind::XpathKeyRegexReplace
            | PathFnKind::XpathValueKeyRegexReplace => 2,
            PathFnKind::XpathMatchRegex => 3,
        }
    }
}

/// Abstract syntax of one constraint rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Infix {
        first: Box<Expr>,
        rest: Vec<(RelOp, Expr)>,
    },
    Additive {
        first: Box<Expr>,
        rest: Vec<(AddOp, Expr)>,
    },
    Must(Box<Expr>),
    Count(Box<Expr>),
    Exists(Box<Expr>),
    Print(Box<Expr>),
    PathFn {
        kind: PathFnKind,
        args: Vec<String>,
    },
    Str(String),
    Num(i64),
    Bool(bool),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("syntax error at token {0}")]
    Syntax(usize),
    #[error("`{name}` takes {expected} argument(s), found {found}")]
    Arity {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Rule {
    Expr,
    Infix,
    Additive,
    Primary,
}

type MemoEntry = Option<(Expr, usize)>;

pub struct Parser {
    tokens: Vec<Token>,
    memo: HashMap<(Rule, usize), MemoEntry>,
    furthest: usize,
    arity_error: Option<ParseError>,
}

/// Parse a token stream into a single program expression.
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        tokens,
        memo: HashMap::new(),
        furthest: 0,
        arity_error: None,
    };
    // program := if-statement | expr
    if let Some((expr, end)) = parser.expr(0) {
        if end == parser.tokens.len() {
            return Ok(expr);
        }
        parser.furthest = parser.furthest.max(end);
    }
    if let Some(arity) = parser.arity_error {
        return Err(arity);
    }
    Err(ParseError::Syntax(parser.furthest))
}

impl Parser {
    fn token(&mut self, pos: usize) -> Option<&Token> {
        let token = self.tokens.get(pos);
        if token.is_none() {
            self.furthest = self.furthest.max(pos);
        }
        token
    }

    fn expect(&mut self, pos: usize, expected: &Token) -> Option<usize> {
        if self.tokens.get(pos) == Some(expected) {
            Some(pos + 1)
        } else {
            self.furthest = self.furthest.max(pos);
            None
        }
    }

    fn memoized<F>(&mut self, rule: Rule, pos: usize, f: F) -> MemoEntry
    where
        F: FnOnce(&mut Self) -> MemoEntry,
    {
        if let Some(hit) = self.memo.get(&(rule, pos)) {
            return hit.clone();
        }
        let computed = f(self);
        self.memo.insert((rule, pos), computed.clone());
        computed
    }

    fn expr(&mut self, pos: usize) -> MemoEntry {
        self.memoized(Rule::Expr, pos, |p| {
            if let Some(hit) = p.if_statement(pos) {
                return Some(hit);
            }
            p.infix(pos)
        })
    }

    fn if_statement(&mut self, pos: usize) -> MemoEntry {
        let pos = self.expect(pos, &Token::If)?;
        let pos = self.expect(pos, &Token::ParenOpen)?;
        let (cond, pos) = self.infix(pos)?;
        let pos = self.expect(pos, &Token::ParenClose)?;
        let pos = self.expect(pos, &Token::Then)?;
        let (then, pos) = self.expr(pos)?;
        let (otherwise, pos) = match self.expect(pos, &Token::Else) {
            Some(after_else) => {
                let (alt, pos) = self.expr(after_else)?;
                (Some(Box::new(alt)), pos)
            }
            None => (None, pos),
        };
        Some((
            Expr::If {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise,
            },
            pos,
        ))
    }

    /// infix := additive (('==' | '<>') additive)*  — left-associative.
    fn infix(&mut self, pos: usize) -> MemoEntry {
        self.memoized(Rule::Infix, pos, |p| {
            let (first, mut pos) = p.additive(pos)?;
            let mut rest = Vec::new();
            loop {
                let op = match p.tokens.get(pos) {
                    Some(Token::Equal) => RelOp::Equal,
                    Some(Token::NotEqual) => RelOp::NotEqual,
                    _ => break,
                };
                let (rhs, next) = p.additive(pos + 1)?;
                rest.push((op, rhs));
                pos = next;
            }
            if rest.is_empty() {
                Some((first, pos))
            } else {
                Some((
                    Expr::Infix {
                        first: Box::new(first),
                        rest,
                    },
                    pos,
                ))
            }
        })
    }

    /// additive := primary (('+' | '-') primary)*
    fn additive(&mut self, pos: usize) -> MemoEntry {
        self.memoized(Rule::Additive, pos, |p| {
            let (first, mut pos) = p.primary(pos)?;
            let mut rest = Vec::new();
            loop {
                let op = match p.tokens.get(pos) {
                    Some(Token::Plus) => AddOp::Plus,
                    Some(Token::Minus) => AddOp::Minus,
                    _ => break,
                };
                let (rhs, next) = p.primary(pos + 1)?;
                rest.push((op, rhs));
                pos = next;
            }
            if rest.is_empty() {
                Some((first, pos))
            } else {
                Some((
                    Expr::Additive {
                        first: Box::new(first),
                        rest,
                    },
                    pos,
                ))
            }
        })
    }

    fn primary(&mut self, pos: usize) -> MemoEntry {
        self.memoized(Rule::Primary, pos, |p| {
            match p.token(pos)?.clone() {
                Token::Must => p.unary(pos, Expr::Must, Self::infix),
                Token::Count => p.unary(pos, Expr::Count, Self::path_fn),
                Token::Exists => p.unary(pos, Expr::Exists, Self::path_fn),
                Token::Print => p.unary(pos, Expr::Print, Self::expr),
                Token::Str(s) => Some((Expr::Str(s), pos + 1)),
                Token::Num(n) => Some((Expr::Num(n), pos + 1)),
                Token::Bool(b) => Some((Expr::Bool(b), pos + 1)),
                Token::ParenOpen => {
                    let (inner, next) = p.infix(pos + 1)?;
                    let next = p.expect(next, &Token::ParenClose)?;
                    Some((inner, next))
                }
                _ => p.path_fn(pos),
            }
        })
    }

    fn unary<W, I>(&mut self, pos: usize, wrap: W, inner: I) -> MemoEntry
    where
        W: FnOnce(Box<Expr>) -> Expr,
        I: FnOnce(&mut Self, usize) -> MemoEntry,
    {
        let pos = self.expect(pos + 1, &Token::ParenOpen)?;
        let (arg, pos) = inner(self, pos)?;
        let pos = self.expect(pos, &Token::ParenClose)?;
        Some((wrap(Box::new(arg)), pos))
    }

    fn path_fn(&mut self, pos: usize) -> MemoEntry {
        let kind = match self.token(pos)?.clone() {
            Token::Xpath => PathFnKind::Xpath,
            Token::XpathValue => PathFnKind::XpathValue,
            Token::XpathAny => PathFnKind::XpathAny,
            Token::XpathAll => PathFnKind::XpathAll,
            Token::XpathMatchRegex => PathFnKind::XpathMatchRegex,
            Token::XpathKeyBased => PathFnKind::XpathKeyBased,
            Token::XpathKeyRegexReplace => PathFnKind::XpathKeyRegexReplace,
            Token::XpathValueKeyRegexReplace => PathFnKind::XpathValueKeyRegexReplace,
            _ => {
                self.furthest = self.furthest.max(pos);
                return None;
            }
        };
        let mut at = self.expect(pos + 1, &Token::ParenOpen)?;
        let mut args = Vec::new();
        loop {
            match self.token(at)?.clone() {
                Token::Str(s) => {
                    args.push(s);
                    at += 1;
                }
                _ => {
                    self.furthest = self.furthest.max(at);
                    return None;
                }
            }
            match self.tokens.get(at) {
                Some(Token::Comma) => at += 1,
                _ => break,
            }
        }
        let at = self.expect(at, &Token::ParenClose)?;
        if args.len() != kind.arity() {
            self.arity_error = Some(ParseError::Arity {
                name: kind.name(),
                expected: kind.arity(),
                found: args.len(),
            });
            return None;
        }
        Some((Expr::PathFn { kind, args }, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::lexer::lex;

    fn parse_str(input: &str) -> Result<Expr, ParseError> {
        parse(lex(input).unwrap())
    }

    #[test]
    fn parses_if_then_without_else() {
        let ast = parse_str("if ('x'=='y') then must(1==2)").unwrap();
        match ast {
            Expr::If { otherwise, .. } => assert!(otherwise.is_none()),
            other => panic!("expected if-statement, got {:?}", other),
        }
    }

    #[test]
    fn parses_if_then_else() {
        let ast = parse_str("if (exists(xpath('a'))) then must(1==1) else must(2==2)").unwrap();
        match ast {
            Expr::If { otherwise, .. } => assert!(otherwise.is_some()),
            other => panic!("expected if-statement, got {:?}", other),
        }
    }

    #[test]
    fn infix_is_left_associative() {
        let ast = parse_str("1 == 1 == true").unwrap();
        match ast {
            Expr::Infix { rest, .. } => assert_eq!(rest.len(), 2),
            other => panic!("expected infix chain, got {:?}", other),
        }
    }

    #[test]
    fn parses_count_over_wildcard() {
        let ast = parse_str("must(count(xpath_all('interface/ethernet/*')) == 0)").unwrap();
        match ast {
            Expr::Must(inner) => match *inner {
                Expr::Infix { .. } => {}
                other => panic!("expected comparison, got {:?}", other),
            },
            other => panic!("expected must, got {:?}", other),
        }
    }

    #[test]
    fn rejects_wrong_arity() {
        assert_eq!(
            parse_str("exists(xpath_key_based('only-one'))"),
            Err(ParseError::Arity {
                name: "xpath_key_based",
                expected: 2,
                found: 1,
            })
        );
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(matches!(
            parse_str("must(1==1) then"),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn parses_additive_arithmetic() {
        let ast = parse_str("must(1 + 2 - 1 == 2)").unwrap();
        match ast {
            Expr::Must(inner) => match *inner {
                Expr::Infix { first, .. } => {
                    assert!(matches!(*first, Expr::Additive { .. }))
                }
                other => panic!("expected comparison, got {:?}", other),
            },
            other => panic!("expected must, got {:?}", other),
        }
    }
}
