//! Preprocessor expressions and their evaluation
//!
//! Expressions are what's left of C preprocessor usage in cells, e.g. `<GIC_SPI (5 + 1) FOO(2)>`.
//! Evaluation is always against a [`MacroTable`] of the definitions visible at the usage.

use std::fmt;

use rustc_hash::FxHashMap;

/// Maximum nesting of macro expansions before evaluation gives up
const MAX_EXPANSION_DEPTH: usize = 64;

/// Macro definitions by name
pub type MacroTable = FxHashMap<String, MacroDefinition>;

/// A `#define`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroDefinition {
    /// `None` for object-like macros, e.g. `#define FOO 1`
    pub params: Option<Vec<String>>,
    pub body: Expression,
}

impl MacroDefinition {
    /// An object-like macro, e.g. `#define GIC_SPI 0`
    pub fn object(body: Expression) -> Self {
        Self { params: None, body }
    }

    /// A function-like macro, e.g. `#define IRQ(n) ((n) + 32)`
    pub fn function(params: impl IntoIterator<Item = impl Into<String>>, body: Expression) -> Self {
        Self {
            params: Some(params.into_iter().map(Into::into).collect()),
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-`
    Negate,
    /// `~`
    BitwiseNot,
    /// `!`
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn apply(self, lhs: u64, rhs: u64) -> Result<u64, EvalError> {
        Ok(match self {
            Self::Add => lhs.wrapping_add(rhs),
            Self::Sub => lhs.wrapping_sub(rhs),
            Self::Mul => lhs.wrapping_mul(rhs),
            Self::Div => lhs.checked_div(rhs).ok_or(EvalError::DivisionByZero)?,
            Self::Rem => lhs.checked_rem(rhs).ok_or(EvalError::DivisionByZero)?,
            Self::Shl => u32::try_from(rhs)
                .ok()
                .and_then(|rhs| lhs.checked_shl(rhs))
                .unwrap_or(0),
            Self::Shr => u32::try_from(rhs)
                .ok()
                .and_then(|rhs| lhs.checked_shr(rhs))
                .unwrap_or(0),
            Self::BitAnd => lhs & rhs,
            Self::BitOr => lhs | rhs,
            Self::BitXor => lhs ^ rhs,
            Self::LogicalAnd => u64::from(lhs != 0 && rhs != 0),
            Self::LogicalOr => u64::from(lhs != 0 || rhs != 0),
            Self::Eq => u64::from(lhs == rhs),
            Self::Ne => u64::from(lhs != rhs),
            Self::Lt => u64::from(lhs < rhs),
            Self::Le => u64::from(lhs <= rhs),
            Self::Gt => u64::from(lhs > rhs),
            Self::Ge => u64::from(lhs >= rhs),
        })
    }
}

/// A preprocessor expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Number(u64),
    /// A macro usage, e.g. `FOO` or `FOO(1, 2)`
    Macro { name: String, args: Vec<Expression> },
    Unary(UnaryOp, Box<Expression>),
    Binary(Box<Expression>, BinaryOp, Box<Expression>),
    Ternary(Box<Expression>, Box<Expression>, Box<Expression>),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("macro `{0}` is not defined")]
    UndefinedMacro(String),
    #[error("macro `{name}` takes {expected} arguments, {found} given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("macro expansion is nested too deeply")]
    RecursionLimit,
}

impl Expression {
    /// Creates a usage of an object-like macro.
    pub fn macro_ref(name: impl Into<String>) -> Self {
        Self::Macro {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn binary(lhs: Expression, op: BinaryOp, rhs: Expression) -> Self {
        Self::Binary(Box::new(lhs), op, Box::new(rhs))
    }

    /// Evaluates the expression with 64-bit unsigned arithmetic like `dtc`.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_tree::{BinaryOp, Expression, MacroDefinition, MacroTable};
    ///
    /// let mut macros = MacroTable::default();
    /// macros.insert("GIC_SPI".to_owned(), MacroDefinition::object(Expression::Number(0)));
    /// macros.insert(
    ///     "IRQ".to_owned(),
    ///     MacroDefinition::function(
    ///         ["n"],
    ///         Expression::binary(
    ///             Expression::macro_ref("n"),
    ///             BinaryOp::Add,
    ///             Expression::Number(32),
    ///         ),
    ///     ),
    /// );
    ///
    /// let expr = Expression::Macro { name: "IRQ".to_owned(), args: vec![Expression::Number(5)] };
    /// assert_eq!(expr.evaluate(&macros), Ok(37));
    /// assert_eq!(Expression::macro_ref("GIC_SPI").evaluate(&macros), Ok(0));
    /// ```
    pub fn evaluate(&self, macros: &MacroTable) -> Result<u64, EvalError> {
        self.evaluate_in(macros, &FxHashMap::default(), 0)
    }

    fn evaluate_in(
        &self,
        macros: &MacroTable,
        params: &FxHashMap<&str, u64>,
        depth: usize,
    ) -> Result<u64, EvalError> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(EvalError::RecursionLimit);
        }
        match self {
            Self::Number(n) => Ok(*n),
            Self::Macro { name, args } => {
                if args.is_empty() {
                    if let Some(value) = params.get(name.as_str()) {
                        return Ok(*value);
                    }
                }
                let def = macros
                    .get(name)
                    .ok_or_else(|| EvalError::UndefinedMacro(name.clone()))?;
                let expected = def.params.as_ref().map_or(0, Vec::len);
                if expected != args.len() {
                    return Err(EvalError::ArgumentCount {
                        name: name.clone(),
                        expected,
                        found: args.len(),
                    });
                }
                let inner_params = match &def.params {
                    Some(names) => names
                        .iter()
                        .zip(args)
                        .map(|(param, arg)| {
                            Ok((param.as_str(), arg.evaluate_in(macros, params, depth + 1)?))
                        })
                        .collect::<Result<FxHashMap<_, _>, EvalError>>()?,
                    None => FxHashMap::default(),
                };
                def.body.evaluate_in(macros, &inner_params, depth + 1)
            }
            Self::Unary(op, expr) => {
                let value = expr.evaluate_in(macros, params, depth + 1)?;
                Ok(match op {
                    UnaryOp::Negate => value.wrapping_neg(),
                    UnaryOp::BitwiseNot => !value,
                    UnaryOp::LogicalNot => u64::from(value == 0),
                })
            }
            Self::Binary(lhs, op, rhs) => {
                let lhs = lhs.evaluate_in(macros, params, depth + 1)?;
                let rhs = rhs.evaluate_in(macros, params, depth + 1)?;
                op.apply(lhs, rhs)
            }
            Self::Ternary(cond, then, otherwise) => {
                if cond.evaluate_in(macros, params, depth + 1)? != 0 {
                    then.evaluate_in(macros, params, depth + 1)
                } else {
                    otherwise.evaluate_in(macros, params, depth + 1)
                }
            }
        }
    }

    /// Evaluates the expression as a cell, keeping the low 32 bits.
    pub fn evaluate_cell(&self, macros: &MacroTable) -> Result<u32, EvalError> {
        self.evaluate(macros).map(|value| {
            #[expect(clippy::cast_possible_truncation, reason = "cells are truncated like dtc")]
            let cell = value as u32;
            cell
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n:#x}"),
            Self::Macro { name, args } if args.is_empty() => f.write_str(name),
            Self::Macro { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Unary(op, expr) => {
                let op = match op {
                    UnaryOp::Negate => "-",
                    UnaryOp::BitwiseNot => "~",
                    UnaryOp::LogicalNot => "!",
                };
                write!(f, "{op}{expr}")
            }
            Self::Binary(lhs, op, rhs) => write!(f, "({lhs} {} {rhs})", op.as_str()),
            Self::Ternary(cond, then, otherwise) => write!(f, "({cond} ? {then} : {otherwise})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(defs: impl IntoIterator<Item = (&'static str, MacroDefinition)>) -> MacroTable {
        defs.into_iter()
            .map(|(name, def)| (name.to_owned(), def))
            .collect()
    }

    #[test]
    fn arithmetic() {
        let macros = MacroTable::default();
        let expr = Expression::binary(
            Expression::binary(Expression::Number(1), BinaryOp::Shl, Expression::Number(4)),
            BinaryOp::BitOr,
            Expression::Number(3),
        );
        assert_eq!(expr.evaluate(&macros), Ok(0x13));
        assert_eq!(
            Expression::binary(Expression::Number(1), BinaryOp::Shl, Expression::Number(64))
                .evaluate(&macros),
            Ok(0)
        );
        assert_eq!(
            Expression::Unary(UnaryOp::Negate, Box::new(Expression::Number(1))).evaluate(&macros),
            Ok(u64::MAX)
        );
    }

    #[test]
    fn cell_truncation() {
        let expr = Expression::Unary(UnaryOp::BitwiseNot, Box::new(Expression::Number(0)));
        assert_eq!(expr.evaluate_cell(&MacroTable::default()), Ok(u32::MAX));
    }

    #[test]
    fn ternary_is_lazy() {
        let expr = Expression::Ternary(
            Box::new(Expression::Number(1)),
            Box::new(Expression::Number(7)),
            Box::new(Expression::macro_ref("UNDEFINED")),
        );
        assert_eq!(expr.evaluate(&MacroTable::default()), Ok(7));
    }

    #[test]
    fn errors() {
        let macros = table([
            ("SELF", MacroDefinition::object(Expression::macro_ref("SELF"))),
            (
                "ONE_ARG",
                MacroDefinition::function(["x"], Expression::macro_ref("x")),
            ),
        ]);
        assert_eq!(
            Expression::macro_ref("NOPE").evaluate(&macros),
            Err(EvalError::UndefinedMacro("NOPE".to_owned()))
        );
        assert_eq!(
            Expression::macro_ref("SELF").evaluate(&macros),
            Err(EvalError::RecursionLimit)
        );
        assert_eq!(
            Expression::macro_ref("ONE_ARG").evaluate(&macros),
            Err(EvalError::ArgumentCount {
                name: "ONE_ARG".to_owned(),
                expected: 1,
                found: 0
            })
        );
        assert_eq!(
            Expression::binary(Expression::Number(1), BinaryOp::Rem, Expression::Number(0))
                .evaluate(&macros),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn nested_function_macros() {
        let macros = table([
            (
                "DOUBLE",
                MacroDefinition::function(
                    ["v"],
                    Expression::binary(
                        Expression::macro_ref("v"),
                        BinaryOp::Mul,
                        Expression::Number(2),
                    ),
                ),
            ),
            (
                "QUAD",
                MacroDefinition::function(
                    ["v"],
                    Expression::Macro {
                        name: "DOUBLE".to_owned(),
                        args: vec![Expression::Macro {
                            name: "DOUBLE".to_owned(),
                            args: vec![Expression::macro_ref("v")],
                        }],
                    },
                ),
            ),
        ]);
        let expr = Expression::Macro {
            name: "QUAD".to_owned(),
            args: vec![Expression::Number(3)],
        };
        assert_eq!(expr.evaluate(&macros), Ok(12));
        assert_eq!(expr.to_string(), "QUAD(0x3)");
    }
}
