use std::fmt;

use dt_diagnostic::text_range::TextRange;
use enum_as_inner::EnumAsInner;

use crate::expr::Expression;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseNumberError {
    #[error("failed to parse number: {0}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("failed to parse number: empty literal")]
    Empty,
}

/// Parses a C-style integer literal: decimal, `0x` hexadecimal or `0`-prefixed octal with
/// optional `U`/`L` suffixes.
///
/// # Example
///
/// ```
/// use dt_tree::parse_number;
///
/// assert_eq!(parse_number("0x4600"), Ok(0x4600));
/// assert_eq!(parse_number("010"), Ok(8));
/// assert_eq!(parse_number("42ULL"), Ok(42));
/// ```
pub fn parse_number(src: &str) -> Result<u64, ParseNumberError> {
    let src = src.trim_end_matches(['u', 'U', 'l', 'L']);
    if src.is_empty() {
        return Err(ParseNumberError::Empty);
    }
    Ok(
        if let Some(hex) = src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)?
        } else if src.len() > 1 && src.starts_with('0') {
            u64::from_str_radix(&src[1..], 8)?
        } else {
            src.parse()?
        },
    )
}

/// A value and where it was written
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spanned<T> {
    pub value: T,
    pub range: TextRange,
}

impl<T> Spanned<T> {
    pub fn new(value: T, range: TextRange) -> Self {
        Self { value, range }
    }
}

/// One comma-separated value of a property
///
/// e.g. `reg = <0x4600 0x100>, <0x5000 0x100>;` has two [`PropValue::Cells`] values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner)]
pub enum PropValue {
    /// e.g. `"okay"`
    String(Spanned<String>),
    /// e.g. `<0x4600 &intc FOO(1)>`
    Cells(CellArray),
    /// e.g. `[de ad be ef]`
    Bytestring(Spanned<Vec<u8>>),
    /// A reference outside of a cell array, which evaluates to the target's path
    ///
    /// e.g. `&uart0`
    Phandle(Spanned<PhandleTarget>),
    /// A bare preprocessor expression, e.g. a macro expanding to a string
    Expression(Spanned<Expression>),
}

impl PropValue {
    /// Returns the range of the whole value, including brackets and quotes.
    pub fn text_range(&self) -> TextRange {
        match self {
            Self::String(s) => s.range,
            Self::Cells(cells) => cells.range,
            Self::Bytestring(b) => b.range,
            Self::Phandle(p) => p.range,
            Self::Expression(e) => e.range,
        }
    }
}

/// A `<...>` cell array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellArray {
    pub cells: Vec<Spanned<Cell>>,
    /// Range including the angle brackets
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner)]
/// A 32-bit integer
pub enum Cell {
    /// e.g. `0x11223344`
    U32(u32),
    /// e.g. `(1 << 3)` or `GIC_SPI`
    Expression(Expression),
    /// A reference to another node, which evaluates to its phandle
    ///
    /// e.g. `&UART_1`
    Phandle(PhandleTarget),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U32(n) => write!(f, "{n:#x}"),
            Self::Expression(expr) => write!(f, "{expr}"),
            Self::Phandle(target) => write!(f, "{target}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A phandle's target
pub enum PhandleTarget {
    /// e.g. `&{/soc/uart}` -> `Path("/soc/uart")`
    Path(String),
    /// e.g. `&UART_1` -> `Label("UART_1")`
    Label(String),
}

impl fmt::Display for PhandleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "&{{{path}}}"),
            Self::Label(label) => write!(f, "&{label}"),
        }
    }
}
