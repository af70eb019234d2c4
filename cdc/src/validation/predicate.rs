use std::cmp::Ordering;

use crate::conversions::text::{parse_date, parse_timestamp, parse_timestamptz};
use crate::error::{CdcResult, ErrorKind};
use crate::types::{Cell, ColumnType, TableSchema};
use crate::validation::ast::{CompareOp, Expr, Literal};
use crate::{bail, cdc_error};

static NULL_CELL: Cell = Cell::Null;

/// Result of evaluating a predicate under SQL three-valued logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn from_bool(value: bool) -> Truth {
        if value { Truth::True } else { Truth::False }
    }

    pub fn is_true(&self) -> bool {
        *self == Truth::True
    }

    fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Column(usize),
    Value(Cell),
}

impl Operand {
    fn value<'a>(&'a self, values: &'a [Cell]) -> &'a Cell {
        match self {
            Operand::Column(index) => values.get(*index).unwrap_or(&NULL_CELL),
            Operand::Value(cell) => cell,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Value(Operand),
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    InList {
        operand: Operand,
        list: Vec<Cell>,
        negated: bool,
    },
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

/// A rule expression resolved against a table schema.
///
/// Columns are bound to their positions and literals are converted to the type of the column
/// they are compared with, so evaluation never fails.
#[derive(Debug, Clone)]
pub struct Predicate {
    root: Node,
}

/// Operand of a comparison before literal coercion.
enum Resolved<'a> {
    Column { index: usize, typ: ColumnType },
    Literal(&'a Literal),
}

impl Predicate {
    /// Compiles `expr` against `schema`.
    ///
    /// Fails with [`ErrorKind::UnknownColumn`] for columns missing from the schema and with
    /// [`ErrorKind::InvalidRule`] for type errors.
    pub fn compile(expr: &Expr, schema: &TableSchema) -> CdcResult<Predicate> {
        let root = compile_node(expr, schema)?;
        Ok(Predicate { root })
    }

    /// Evaluates the predicate over a row in schema column order.
    pub fn evaluate(&self, values: &[Cell]) -> Truth {
        evaluate_node(&self.root, values)
    }
}

fn compile_node(expr: &Expr, schema: &TableSchema) -> CdcResult<Node> {
    let node = match expr {
        Expr::Column(name) => {
            let (index, typ) = resolve_column(name, schema)?;
            if typ != ColumnType::Bool {
                bail!(
                    ErrorKind::InvalidRule,
                    "Rule expression is not boolean",
                    format!("Column `{name}` of type {typ} cannot be used as a condition")
                );
            }
            Node::Value(Operand::Column(index))
        }
        Expr::Literal(literal @ (Literal::Bool(_) | Literal::Null)) => {
            Node::Value(Operand::Value(literal_cell(literal)))
        }
        Expr::Literal(literal) => {
            bail!(
                ErrorKind::InvalidRule,
                "Rule expression is not boolean",
                format!("Literal {literal} cannot be used as a condition")
            );
        }
        Expr::Compare { op, left, right } => {
            let left = resolve_operand(left, schema)?;
            let right = resolve_operand(right, schema)?;
            let (left, right) = coerce_pair(&left, &right, schema)?;
            Node::Compare {
                op: *op,
                left,
                right,
            }
        }
        Expr::IsNull { expr, negated } => {
            let operand = match resolve_operand(expr, schema)? {
                Resolved::Column { index, .. } => Operand::Column(index),
                Resolved::Literal(literal) => Operand::Value(literal_cell(literal)),
            };
            Node::IsNull {
                operand,
                negated: *negated,
            }
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let (operand, list) = match resolve_operand(expr, schema)? {
                Resolved::Column { index, typ } => {
                    let list = list
                        .iter()
                        .map(|literal| coerce_literal(literal, typ, &schema.column_schemas[index].name))
                        .collect::<CdcResult<Vec<_>>>()?;
                    (Operand::Column(index), list)
                }
                Resolved::Literal(literal) => {
                    (Operand::Value(literal_cell(literal)), list.iter().map(literal_cell).collect())
                }
            };
            Node::InList {
                operand,
                list,
                negated: *negated,
            }
        }
        Expr::Not(expr) => Node::Not(Box::new(compile_node(expr, schema)?)),
        Expr::And(left, right) => Node::And(
            Box::new(compile_node(left, schema)?),
            Box::new(compile_node(right, schema)?),
        ),
        Expr::Or(left, right) => Node::Or(
            Box::new(compile_node(left, schema)?),
            Box::new(compile_node(right, schema)?),
        ),
    };

    Ok(node)
}

fn resolve_column(name: &str, schema: &TableSchema) -> CdcResult<(usize, ColumnType)> {
    match schema.column_index(name) {
        Some(index) => Ok((index, schema.column_schemas[index].typ)),
        None => bail!(
            ErrorKind::UnknownColumn,
            "Rule references an unknown column",
            format!("Column `{name}` does not exist in table '{}'", schema.name)
        ),
    }
}

fn resolve_operand<'a>(expr: &'a Expr, schema: &TableSchema) -> CdcResult<Resolved<'a>> {
    match expr {
        Expr::Column(name) => {
            let (index, typ) = resolve_column(name, schema)?;
            Ok(Resolved::Column { index, typ })
        }
        Expr::Literal(literal) => Ok(Resolved::Literal(literal)),
        other => bail!(
            ErrorKind::InvalidRule,
            "Invalid rule operand",
            format!("Only columns and literals can be compared, found {other}")
        ),
    }
}

fn coerce_pair(
    left: &Resolved<'_>,
    right: &Resolved<'_>,
    schema: &TableSchema,
) -> CdcResult<(Operand, Operand)> {
    let column_name = |index: usize| schema.column_schemas[index].name.as_str();

    match (left, right) {
        (
            Resolved::Column {
                index: left_index,
                typ: left_typ,
            },
            Resolved::Column {
                index: right_index,
                typ: right_typ,
            },
        ) => {
            let comparable = (left_typ.is_numeric() && right_typ.is_numeric())
                || (left_typ == right_typ && *left_typ != ColumnType::Json);
            if !comparable {
                bail!(
                    ErrorKind::InvalidRule,
                    "Rule compares incompatible types",
                    format!(
                        "Column `{}` of type {left_typ} cannot be compared with column `{}` of type {right_typ}",
                        column_name(*left_index),
                        column_name(*right_index)
                    )
                );
            }

            Ok((Operand::Column(*left_index), Operand::Column(*right_index)))
        }
        (Resolved::Column { index, typ }, Resolved::Literal(literal)) => Ok((
            Operand::Column(*index),
            Operand::Value(coerce_literal(literal, *typ, column_name(*index))?),
        )),
        (Resolved::Literal(literal), Resolved::Column { index, typ }) => Ok((
            Operand::Value(coerce_literal(literal, *typ, column_name(*index))?),
            Operand::Column(*index),
        )),
        (Resolved::Literal(left), Resolved::Literal(right)) => {
            let left = literal_cell(left);
            let right = literal_cell(right);
            let comparable = left.is_null()
                || right.is_null()
                || compare_cells(&left, &right).is_some();
            if !comparable {
                bail!(
                    ErrorKind::InvalidRule,
                    "Rule compares incompatible types",
                    format!("Literal {left} cannot be compared with literal {right}")
                );
            }

            Ok((Operand::Value(left), Operand::Value(right)))
        }
    }
}

fn literal_cell(literal: &Literal) -> Cell {
    match literal {
        Literal::Null => Cell::Null,
        Literal::Bool(value) => Cell::Bool(*value),
        Literal::Int(value) => Cell::I64(*value),
        Literal::Float(value) => Cell::F64(*value),
        Literal::Str(value) => Cell::String(value.clone()),
    }
}

/// Converts `literal` to a cell comparable with a column of type `typ`.
fn coerce_literal(literal: &Literal, typ: ColumnType, column: &str) -> CdcResult<Cell> {
    let cell = match (literal, typ) {
        (Literal::Null, _) => Some(Cell::Null),
        (Literal::Int(value), typ) if typ.is_numeric() => Some(Cell::I64(*value)),
        (Literal::Float(value), typ) if typ.is_numeric() => Some(Cell::F64(*value)),
        (Literal::Bool(value), ColumnType::Bool) => Some(Cell::Bool(*value)),
        (Literal::Str(value), ColumnType::String) => Some(Cell::String(value.clone())),
        (Literal::Str(value), ColumnType::Date) => parse_date(value).ok().map(Cell::Date),
        (Literal::Str(value), ColumnType::Timestamp) => {
            parse_timestamp(value).ok().map(Cell::Timestamp)
        }
        (Literal::Str(value), ColumnType::TimestampTz) => {
            parse_timestamptz(value).ok().map(Cell::TimestampTz)
        }
        _ => None,
    };

    cell.ok_or_else(|| {
        cdc_error!(
            ErrorKind::InvalidRule,
            "Rule compares incompatible types",
            format!("Literal {literal} cannot be compared with column `{column}` of type {typ}")
        )
    })
}

/// Orders two cells, [`None`] when either is null or the types are not comparable.
fn compare_cells(a: &Cell, b: &Cell) -> Option<Ordering> {
    match (a, b) {
        (Cell::Bool(a), Cell::Bool(b)) => Some(a.cmp(b)),
        (Cell::String(a), Cell::String(b)) => Some(a.cmp(b)),
        (Cell::Date(a), Cell::Date(b)) => Some(a.cmp(b)),
        (Cell::Timestamp(a), Cell::Timestamp(b)) => Some(a.cmp(b)),
        (Cell::TimestampTz(a), Cell::TimestampTz(b)) => Some(a.cmp(b)),
        (a, b) => match (as_i64(a), as_i64(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
        },
    }
}

fn as_i64(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::I32(value) => Some(i64::from(*value)),
        Cell::I64(value) => Some(*value),
        _ => None,
    }
}

fn as_f64(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::I32(value) => Some(f64::from(*value)),
        Cell::I64(value) => Some(*value as f64),
        Cell::F64(value) => Some(*value),
        _ => None,
    }
}

fn evaluate_node(node: &Node, values: &[Cell]) -> Truth {
    match node {
        Node::Value(operand) => match operand.value(values) {
            Cell::Bool(value) => Truth::from_bool(*value),
            _ => Truth::Unknown,
        },
        Node::Compare { op, left, right } => {
            let Some(ordering) = compare_cells(left.value(values), right.value(values)) else {
                return Truth::Unknown;
            };

            let result = match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::NotEq => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtEq => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
            };
            Truth::from_bool(result)
        }
        Node::IsNull { operand, negated } => {
            Truth::from_bool(operand.value(values).is_null() != *negated)
        }
        Node::InList {
            operand,
            list,
            negated,
        } => {
            let value = operand.value(values);
            if value.is_null() {
                return Truth::Unknown;
            }

            let found = if list
                .iter()
                .any(|item| compare_cells(value, item) == Some(Ordering::Equal))
            {
                Truth::True
            } else if list.iter().any(Cell::is_null) {
                Truth::Unknown
            } else {
                Truth::False
            };

            if *negated { found.not() } else { found }
        }
        Node::Not(node) => evaluate_node(node, values).not(),
        Node::And(left, right) => evaluate_node(left, values).and(evaluate_node(right, values)),
        Node::Or(left, right) => evaluate_node(left, values).or(evaluate_node(right, values)),
    }
}
