//! Constraint rule evaluation.
//!
//! # Responsibilities
//! - Evaluate parsed rules against a candidate tree
//! - Carry the evaluation context (schema, tree, node, continue flag,
//!   result flag) explicitly per call
//! - Map every internal failure to a constraint failure (fail closed)
//!
//! # Design Decisions
//! - A vacuously true implication (`if` with a false condition and no
//!   `else`) reports success and skips the remaining sibling rules
//! - A false `must` clears the continue flag; later rules never run
//! - Type mismatches in comparisons abort the rule, they do not coerce

use regex::Regex;
use thiserror::Error;

use super::lexer::{lex, LexError};
use super::parser::{parse, AddOp, Expr, ParseError, PathFnKind, RelOp};
use crate::path;
use crate::tree::{NodeId, Tree, Value};

/// Runtime value domain of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Bool(bool),
    Num(i64),
    Str(String),
    Paths(Vec<String>),
}

fn type_name(value: &EvalValue) -> &'static str {
    match value {
        EvalValue::Bool(_) => "boolean",
        EvalValue::Num(_) => "number",
        EvalValue::Str(_) => "string",
        EvalValue::Paths(_) => "path set",
    }
}

fn truthy(value: &EvalValue) -> bool {
    match value {
        EvalValue::Bool(b) => *b,
        EvalValue::Num(n) => *n != 0,
        EvalValue::Str(s) => !s.is_empty(),
        EvalValue::Paths(p) => !p.is_empty(),
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("cannot compare {0} with {1}")]
    Comparison(&'static str, &'static str),
    #[error("arithmetic requires numbers, found {0}")]
    Arithmetic(&'static str),
    #[error("`{0}` did not resolve to a node")]
    Unresolved(String),
    #[error("`{0}` is not a leaf")]
    NotALeaf(String),
    #[error("value at `{0}` has no expression representation")]
    Unliftable(String),
    #[error("invalid regex `{re}`: {source}")]
    BadRegex {
        re: String,
        #[source]
        source: Box<regex::Error>,
    },
    #[error("no keyed-list ancestor supplies a key for `{0}`")]
    NoContextKey(String),
    #[error("count/exists argument did not produce a path set")]
    NotPaths,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Per-call evaluation context. Never shared across rules from
/// different nodes, calls, or threads.
pub struct EvalContext<'a> {
    schema: &'a Tree,
    tree: &'a Tree,
    node: NodeId,
    keep_going: bool,
    result: bool,
}

impl<'a> EvalContext<'a> {
    pub fn new(schema: &'a Tree, tree: &'a Tree, node: NodeId) -> Self {
        EvalContext {
            schema,
            tree,
            node,
            keep_going: true,
            result: true,
        }
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }

    pub fn result(&self) -> bool {
        self.result
    }

    /// Evaluate one rule, folding any machinery failure into a
    /// constraint failure.
    pub fn run(&mut self, rule: &str) {
        match self.try_run(rule) {
            Ok(()) => {}
            Err(error) => {
                tracing::warn!(rule, error = %error, "constraint evaluation failed");
                self.result = false;
                self.keep_going = false;
            }
        }
    }

    fn try_run(&mut self, rule: &str) -> Result<(), RuleError> {
        let tokens = lex(rule)?;
        let ast = parse(tokens)?;
        let value = self.eval(&ast)?;
        match ast {
            // These set the flags themselves.
            Expr::If { .. } | Expr::Must(_) => {}
            _ => self.result = truthy(&value),
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<EvalValue, EvalError> {
        match expr {
            Expr::Str(s) => Ok(EvalValue::Str(s.clone())),
            Expr::Num(n) => Ok(EvalValue::Num(*n)),
            Expr::Bool(b) => Ok(EvalValue::Bool(*b)),
            Expr::Print(inner) => {
                let value = self.eval(inner)?;
                tracing::debug!(value = ?value, "constraint print");
                Ok(value)
            }
            Expr::Must(inner) => {
                let value = self.eval(inner)?;
                let ok = truthy(&value);
                self.result = ok;
                if !ok {
                    self.keep_going = false;
                }
                Ok(EvalValue::Bool(ok))
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond)?;
                if truthy(&cond) {
                    let value = self.eval(then)?;
                    self.apply_branch(then, &value);
                } else if let Some(alt) = otherwise {
                    let value = self.eval(alt)?;
                    self.apply_branch(alt, &value);
                } else {
                    // Material implication: a false condition satisfies
                    // the rule and short-circuits its siblings.
                    self.result = true;
                    self.keep_going = false;
                }
                Ok(EvalValue::Bool(self.result))
            }
            Expr::Infix { first, rest } => {
                let mut acc = self.eval(first)?;
                for (op, rhs) in rest {
                    let rhs = self.eval(rhs)?;
                    acc = EvalValue::Bool(compare(&acc, *op, &rhs)?);
                }
                Ok(acc)
            }
            Expr::Additive { first, rest } => {
                let mut acc = self.number(first)?;
                for (op, rhs) in rest {
                    let rhs = self.number(rhs)?;
                    acc = match op {
                        AddOp::Plus => acc + rhs,
                        AddOp::Minus => acc - rhs,
                    };
                }
                Ok(EvalValue::Num(acc))
            }
            Expr::Count(inner) => {
                let paths = self.paths(inner)?;
                Ok(EvalValue::Num(paths.len() as i64))
            }
            Expr::Exists(inner) => {
                let paths = self.paths(inner)?;
                Ok(EvalValue::Bool(!paths.is_empty()))
            }
            Expr::PathFn { kind, args } => self.eval_path_fn(*kind, args),
        }
    }

    fn apply_branch(&mut self, branch: &Expr, value: &EvalValue) {
        match branch {
            // Already applied their own result.
            Expr::Must(_) | Expr::If { .. } => {}
            _ => self.result = truthy(value),
        }
    }

    fn number(&mut self, expr: &Expr) -> Result<i64, EvalError> {
        match self.eval(expr)? {
            EvalValue::Num(n) => Ok(n),
            other => Err(EvalError::Arithmetic(type_name(&other))),
        }
    }

    fn paths(&mut self, expr: &Expr) -> Result<Vec<String>, EvalError> {
        match self.eval(expr)? {
            EvalValue::Paths(paths) => Ok(paths),
            _ => Err(EvalError::NotPaths),
        }
    }

    fn eval_path_fn(&mut self, kind: PathFnKind, args: &[String]) -> Result<EvalValue, EvalError> {
        match kind {
            PathFnKind::Xpath => Ok(EvalValue::Paths(
                self.resolve_existing(&args[0]).into_iter().collect(),
            )),
            PathFnKind::XpathValue => self.deref_value(&args[0]),
            PathFnKind::XpathAny => {
                let mut expanded = self.expand(&args[0]);
                expanded.truncate(1);
                Ok(EvalValue::Paths(expanded))
            }
            PathFnKind::XpathAll => Ok(EvalValue::Paths(self.expand(&args[0]))),
            PathFnKind::XpathMatchRegex => {
                let re = compile(&args[0])?;
                let value = self.string_value(&args[1])?;
                let Some(key) = capture_key(&re, &value) else {
                    return Ok(EvalValue::Paths(Vec::new()));
                };
                let target = substitute_item(&args[2], &key);
                Ok(EvalValue::Paths(
                    self.resolve_existing(&target).into_iter().collect(),
                ))
            }
            PathFnKind::XpathKeyBased => {
                let key = self.string_value(&args[0])?;
                let target = substitute_item(&args[1], &key);
                Ok(EvalValue::Paths(
                    self.resolve_existing(&target).into_iter().collect(),
                ))
            }
            PathFnKind::XpathKeyRegexReplace => {
                let target = self.regex_keyed_path(&args[0], &args[1])?;
                Ok(EvalValue::Paths(
                    self.resolve_existing(&target).into_iter().collect(),
                ))
            }
            PathFnKind::XpathValueKeyRegexReplace => {
                let target = self.regex_keyed_path(&args[0], &args[1])?;
                self.deref_value(&target)
            }
        }
    }

    /// Substitute placeholders and return the path when it names an
    /// existing node in the tree under validation.
    fn resolve_existing(&self, raw: &str) -> Option<String> {
        let substituted = path::evaluate_xpath(self.tree, self.schema, self.node, raw)?;
        path::select(self.tree, &substituted).map(|_| substituted)
    }

    /// Substitute placeholders, then expand a `*` wildcard against the
    /// concrete tree. Unresolvable placeholders yield no paths.
    fn expand(&self, raw: &str) -> Vec<String> {
        match path::evaluate_xpath(self.tree, self.schema, self.node, raw) {
            Some(substituted) => path::expand_wildcard(self.tree, &substituted),
            None => Vec::new(),
        }
    }

    /// Dereference a path to its leaf value, lifted into the expression
    /// domain.
    fn deref_value(&self, raw: &str) -> Result<EvalValue, EvalError> {
        let substituted = path::evaluate_xpath(self.tree, self.schema, self.node, raw)
            .ok_or_else(|| EvalError::Unresolved(raw.to_string()))?;
        let id = path::select(self.tree, &substituted)
            .ok_or_else(|| EvalError::Unresolved(substituted.clone()))?;
        let value = self
            .tree
            .leaf_value(id)
            .ok_or_else(|| EvalError::NotALeaf(substituted.clone()))?;
        match value {
            Value::Bool(b) => Ok(EvalValue::Bool(*b)),
            Value::Int(n) => Ok(EvalValue::Num(*n)),
            Value::Str(s) => Ok(EvalValue::Str(s.clone())),
            Value::StrList(_) | Value::NodeList(_) => {
                Err(EvalError::Unliftable(substituted))
            }
        }
    }

    fn string_value(&self, raw: &str) -> Result<String, EvalError> {
        match self.deref_value(raw)? {
            EvalValue::Str(s) => Ok(s),
            EvalValue::Num(n) => Ok(n.to_string()),
            EvalValue::Bool(b) => Ok(b.to_string()),
            EvalValue::Paths(_) => Err(EvalError::Unliftable(raw.to_string())),
        }
    }

    /// Derive a key from the validated node's list-member ancestor via
    /// a regex capture and substitute it into `[@item]`.
    fn regex_keyed_path(&self, re: &str, target: &str) -> Result<String, EvalError> {
        let re = compile(re)?;
        let key = path::list_member_key(self.tree, self.schema, self.node)
            .ok_or_else(|| EvalError::NoContextKey(target.to_string()))?;
        let derived = capture_key(&re, &key)
            .ok_or_else(|| EvalError::NoContextKey(target.to_string()))?;
        Ok(substitute_item(target, &derived))
    }
}

fn compile(re: &str) -> Result<Regex, EvalError> {
    Regex::new(re).map_err(|source| EvalError::BadRegex {
        re: re.to_string(),
        source: Box::new(source),
    })
}

/// First capture group when present, whole match otherwise.
fn capture_key(re: &Regex, input: &str) -> Option<String> {
    let captures = re.captures(input)?;
    let matched = captures.get(1).or_else(|| captures.get(0))?;
    Some(matched.as_str().to_string())
}

/// Replace `[@item]` placeholders (standalone or as a compound key)
/// with a concrete key.
fn substitute_item(raw: &str, key: &str) -> String {
    use crate::path::{render, tokenize, Segment};
    let mut segments = tokenize(raw);
    for segment in segments.iter_mut() {
        match segment {
            Segment::Item => *segment = Segment::Name(key.to_string()),
            Segment::Keyed { key: slot, .. } if slot == "@item" => *slot = key.to_string(),
            _ => {}
        }
    }
    render(&segments)
}

fn compare(left: &EvalValue, op: RelOp, right: &EvalValue) -> Result<bool, EvalError> {
    let equal = match (left, right) {
        (EvalValue::Bool(a), EvalValue::Bool(b)) => a == b,
        (EvalValue::Num(a), EvalValue::Num(b)) => a == b,
        (EvalValue::Str(a), EvalValue::Str(b)) => a == b,
        _ => return Err(EvalError::Comparison(type_name(left), type_name(right))),
    };
    Ok(match op {
        RelOp::Equal => equal,
        RelOp::NotEqual => !equal,
    })
}

/// Evaluate a single rule against `node`; fail closed.
pub fn validate(schema: &Tree, tree: &Tree, node: NodeId, rule: &str) -> bool {
    let mut ctx = EvalContext::new(schema, tree, node);
    ctx.run(rule);
    ctx.result()
}

/// Evaluate a node's rule list in order. A rule that clears the
/// continue flag skips its siblings; a failed rule fails the set.
pub fn validate_all<'r, I>(schema: &Tree, tree: &Tree, node: NodeId, rules: I) -> bool
where
    I: IntoIterator<Item = &'r str>,
{
    let mut ctx = EvalContext::new(schema, tree, node);
    for rule in rules {
        if !ctx.keep_going() {
            break;
        }
        ctx.run(rule);
        if !ctx.result() {
            break;
        }
    }
    ctx.result()
}
