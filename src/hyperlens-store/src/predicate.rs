//! Value predicates evaluated against attribute dictionaries.

use std::fmt;

use serde::{Deserialize, Serialize};

use hyperlens_core::Value;

/// Column a predicate tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Domain value (`$v`).
    Value,
    /// Value id (`$1`).
    ValueId,
}

impl Operand {
    /// Column name in the store.
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Value => "val",
            Self::ValueId => "ha1",
        }
    }

    /// Query vocabulary token.
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Value => "$v",
            Self::ValueId => "$1",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    /// Parse an operator symbol.
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::NotEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::LtEq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::GtEq),
            _ => None,
        }
    }

    /// SQL symbol.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// A predicate over one attribute's dictionary rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// `operand <op> value`.
    Compare {
        operand: Operand,
        op: CmpOp,
        value: Value,
    },
    /// `operand [NOT] BETWEEN low AND high`.
    Between {
        operand: Operand,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `operand [NOT] IN (values)`.
    In {
        operand: Operand,
        values: Vec<Value>,
        negated: bool,
    },
    /// `operand [NOT] LIKE pattern`.
    Like {
        operand: Operand,
        pattern: String,
        negated: bool,
    },
    /// `operand [NOT] IN table`, membership in a named memory table.
    InTable {
        operand: Operand,
        table: String,
        negated: bool,
    },
    /// The operand itself, read as a flag.
    IsTrue { operand: Operand },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjunction of two predicates.
    pub fn and(self, other: Predicate) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Disjunction of two predicates.
    pub fn or(self, other: Predicate) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Negation of this predicate.
    pub fn negate(self) -> Self {
        match self {
            Self::Between {
                operand,
                low,
                high,
                negated,
            } => Self::Between {
                operand,
                low,
                high,
                negated: !negated,
            },
            Self::In {
                operand,
                values,
                negated,
            } => Self::In {
                operand,
                values,
                negated: !negated,
            },
            Self::Like {
                operand,
                pattern,
                negated,
            } => Self::Like {
                operand,
                pattern,
                negated: !negated,
            },
            Self::InTable {
                operand,
                table,
                negated,
            } => Self::InTable {
                operand,
                table,
                negated: !negated,
            },
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Names of the memory tables this predicate reads.
    pub fn tables(&self) -> Vec<&str> {
        match self {
            Self::InTable { table, .. } => vec![table.as_str()],
            Self::And(l, r) | Self::Or(l, r) => {
                let mut tables = l.tables();
                tables.extend(r.tables());
                tables
            }
            Self::Not(inner) => inner.tables(),
            _ => Vec::new(),
        }
    }

    /// Operands this predicate reads as flags.
    pub fn flags(&self) -> Vec<Operand> {
        match self {
            Self::IsTrue { operand } => vec![*operand],
            Self::And(l, r) | Self::Or(l, r) => {
                let mut flags = l.flags();
                flags.extend(r.flags());
                flags
            }
            Self::Not(inner) => inner.flags(),
            _ => Vec::new(),
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { operand, op, value } => {
                write!(f, "{} {} {value}", operand.token(), op.symbol())
            }
            Self::Between {
                operand,
                low,
                high,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {low} AND {high}",
                operand.token(),
                not(*negated)
            ),
            Self::In {
                operand,
                values,
                negated,
            } => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{} {}IN ({})",
                    operand.token(),
                    not(*negated),
                    items.join(", ")
                )
            }
            Self::Like {
                operand,
                pattern,
                negated,
            } => write!(f, "{} {}LIKE '{pattern}'", operand.token(), not(*negated)),
            Self::InTable {
                operand,
                table,
                negated,
            } => write!(f, "{} {}IN {table}", operand.token(), not(*negated)),
            Self::IsTrue { operand } => write!(f, "{}", operand.token()),
            Self::And(l, r) => write!(f, "({l} AND {r})"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

/// Match `text` against a SQL `LIKE` pattern (`%` any run, `_` one char,
/// `\` escapes the next char).
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => tokens.push(LikeToken::Literal(chars.next().unwrap_or('\\'))),
            '%' => tokens.push(LikeToken::AnyRun),
            '_' => tokens.push(LikeToken::AnyChar),
            other => tokens.push(LikeToken::Literal(other)),
        }
    }

    // matched[j]: pattern prefix of length j matches the text prefix seen so far
    let mut matched = vec![false; tokens.len() + 1];
    matched[0] = true;
    for j in 1..=tokens.len() {
        matched[j] = matched[j - 1] && tokens[j - 1] == LikeToken::AnyRun;
    }
    for ch in text {
        let mut next = vec![false; tokens.len() + 1];
        for j in 1..=tokens.len() {
            next[j] = match tokens[j - 1] {
                LikeToken::AnyRun => next[j - 1] || matched[j],
                LikeToken::AnyChar => matched[j - 1],
                LikeToken::Literal(l) => matched[j - 1] && l == ch,
            };
        }
        matched = next;
    }
    matched[tokens.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    Literal(char),
    AnyChar,
    AnyRun,
}
