//! Predicate tree compiler (SPEC_FULL.md §4.3).
//!
//! Compiles a structured predicate tree into a closure-based evaluator, with
//! enum ordinal tables pre-resolved at compile time so the hot per-row path
//! never re-parses a comparison. Grounded on the teacher's expression
//! evaluator (`src/execution/expressions.rs`) for the "compiled AST, no
//! runtime codegen" shape, adapted from a SQL-scalar evaluator to a
//! row-predicate one.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{Result, ViewstreamError};
use crate::schema::{DataType, ViewDefinition};
use crate::value::{Row, Value};

/// The wire/JSON shape of a predicate tree (spec.md §4.3's grammar).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredicateNode {
    And {
        #[serde(rename = "_and")]
        and: Vec<PredicateNode>,
    },
    Or {
        #[serde(rename = "_or")]
        or: Vec<PredicateNode>,
    },
    Not {
        #[serde(rename = "_not")]
        not: Box<PredicateNode>,
    },
    /// `{field: {op: literal, ...}, ...}` — multiple fields/ops at the same
    /// level are joined by AND (spec.md §4.3 "Precedence").
    FieldMap(std::collections::HashMap<String, std::collections::HashMap<String, Literal>>),
}

/// A comparison literal. `_in`/`_nin` carry a `Seq`; everything else a
/// scalar.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Literal>),
}

impl Literal {
    fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Seq(_) => Value::Null, // not a scalar; never dereferenced
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Nin,
    IsNull,
}

impl CmpOp {
    fn parse(s: &str) -> Result<CmpOp> {
        Ok(match s {
            "_eq" => CmpOp::Eq,
            "_neq" => CmpOp::Neq,
            "_gt" => CmpOp::Gt,
            "_lt" => CmpOp::Lt,
            "_gte" => CmpOp::Gte,
            "_lte" => CmpOp::Lte,
            "_in" => CmpOp::In,
            "_nin" => CmpOp::Nin,
            "_is_null" => CmpOp::IsNull,
            other => {
                return Err(ViewstreamError::PredicateCompile(format!(
                    "unknown operator '{other}'"
                )))
            }
        })
    }
}

/// One compiled `field op literal` comparison.
struct Comparison {
    field: String,
    op: CmpOp,
    literal: Value,
    /// Populated only when the field is enum-typed and `op` is an ordinal
    /// comparison: the literal's pre-resolved ordinal, or `None` if the
    /// literal isn't a member of the enum (spec.md §4.3: "a literal not in
    /// the enum evaluates the comparison to false"). The row's own ordinal
    /// is resolved once at parse time (`Value::Enum`), so evaluation never
    /// rescans an enum's value list.
    enum_ordinal: Option<Option<usize>>,
    seq: Vec<Value>,
    is_bool_true: bool,
}

enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Cmp(Comparison),
}

/// A compiled predicate: `{evaluate, fields, sourceExpression}` (spec.md §3/§4.3).
pub struct Predicate {
    root: Node,
    fields: HashSet<String>,
    source_expression: String,
}

impl Predicate {
    pub fn fields(&self) -> &HashSet<String> {
        &self.fields
    }

    pub fn source_expression(&self) -> &str {
        &self.source_expression
    }

    /// Evaluates the predicate against a row. Per spec.md §4.5, evaluation
    /// errors are the caller's concern to catch (there are none here since
    /// this evaluator can't throw — type mismatches just compare unequal —
    /// but the boundary is kept explicit for symmetry with the spec).
    pub fn evaluate(&self, row: &Row) -> bool {
        eval_node(&self.root, row)
    }
}

fn eval_node(node: &Node, row: &Row) -> bool {
    match node {
        Node::And(children) => children.iter().all(|c| eval_node(c, row)),
        Node::Or(children) => children.iter().any(|c| eval_node(c, row)),
        Node::Not(child) => !eval_node(child, row),
        Node::Cmp(cmp) => eval_cmp(cmp, row),
    }
}

fn eval_cmp(cmp: &Comparison, row: &Row) -> bool {
    let actual = row.get(&cmp.field).unwrap_or(&Value::Null);

    match cmp.op {
        CmpOp::IsNull => actual.is_null() == cmp.is_bool_true,
        CmpOp::Eq => values_eq(actual, &cmp.literal),
        CmpOp::Neq => !values_eq(actual, &cmp.literal),
        CmpOp::In => cmp.seq.iter().any(|v| values_eq(actual, v)),
        CmpOp::Nin => !cmp.seq.iter().any(|v| values_eq(actual, v)),
        CmpOp::Gt | CmpOp::Gte | CmpOp::Lt | CmpOp::Lte => {
            if let Some(literal_ordinal) = cmp.enum_ordinal {
                let Some(literal_ord) = literal_ordinal else {
                    // literal not in the enum: ordinal comparison is false.
                    return false;
                };
                let Some(actual_ord) = actual.enum_ordinal() else {
                    return false;
                };
                ordinal_cmp(cmp.op, actual_ord, literal_ord)
            } else {
                natural_cmp(cmp.op, actual, &cmp.literal)
            }
        }
    }
}

fn ordinal_cmp(op: CmpOp, a: usize, b: usize) -> bool {
    match op {
        CmpOp::Gt => a > b,
        CmpOp::Gte => a >= b,
        CmpOp::Lt => a < b,
        CmpOp::Lte => a <= b,
        _ => unreachable!(),
    }
}

fn natural_cmp(op: CmpOp, actual: &Value, literal: &Value) -> bool {
    let ord = match (actual, literal) {
        (Value::Int(a), Value::Int(b)) => (*a).partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) | (Value::BigIntStr(a), Value::Str(b)) => {
            Some(a.as_str().cmp(b.as_str()))
        }
        (Value::Str(a), Value::BigIntStr(b)) | (Value::BigIntStr(a), Value::BigIntStr(b)) => {
            Some(a.as_str().cmp(b.as_str()))
        }
        _ => None,
    };
    let Some(ord) = ord else { return false };
    match op {
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Gte => ord.is_ge(),
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Lte => ord.is_le(),
        _ => unreachable!(),
    }
}

fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Str(x), Value::Str(y))
        | (Value::BigIntStr(x), Value::BigIntStr(y))
        | (Value::Str(x), Value::BigIntStr(y))
        | (Value::BigIntStr(x), Value::Str(y)) => x == y,
        (Value::Enum { value: x, .. }, Value::Str(y))
        | (Value::Str(x), Value::Enum { value: y, .. })
        | (Value::Enum { value: x, .. }, Value::Enum { value: y, .. }) => x == y,
        _ => false,
    }
}

/// Compiles a predicate tree against a view's schema. Errors (spec.md §4.3):
/// empty tree, unknown operator, non-sequence argument to `_in`/`_nin`.
pub fn compile(tree: &PredicateNode, view: &ViewDefinition) -> Result<Predicate> {
    let mut fields = HashSet::new();
    let root = compile_node(tree, view, &mut fields)?;
    Ok(Predicate {
        root,
        fields,
        source_expression: format!("{tree:?}"),
    })
}

fn compile_node(
    tree: &PredicateNode,
    view: &ViewDefinition,
    fields: &mut HashSet<String>,
) -> Result<Node> {
    match tree {
        PredicateNode::And { and } => {
            if and.is_empty() {
                return Err(ViewstreamError::PredicateCompile(
                    "empty _and predicate".to_string(),
                ));
            }
            let children = and
                .iter()
                .map(|c| compile_node(c, view, fields))
                .collect::<Result<Vec<_>>>()?;
            Ok(Node::And(children))
        }
        PredicateNode::Or { or } => {
            if or.is_empty() {
                return Err(ViewstreamError::PredicateCompile(
                    "empty _or predicate".to_string(),
                ));
            }
            let children = or
                .iter()
                .map(|c| compile_node(c, view, fields))
                .collect::<Result<Vec<_>>>()?;
            Ok(Node::Or(children))
        }
        PredicateNode::Not { not } => Ok(Node::Not(Box::new(compile_node(not, view, fields)?))),
        PredicateNode::FieldMap(map) => {
            if map.is_empty() {
                return Err(ViewstreamError::PredicateCompile(
                    "empty predicate tree".to_string(),
                ));
            }
            let mut conjuncts = Vec::new();
            for (field, ops) in map {
                if ops.is_empty() {
                    return Err(ViewstreamError::PredicateCompile(format!(
                        "no operators for field '{field}'"
                    )));
                }
                fields.insert(field.clone());
                for (op_str, literal) in ops {
                    let op = CmpOp::parse(op_str)?;
                    let seq = match (&op, literal) {
                        (CmpOp::In, Literal::Seq(items)) | (CmpOp::Nin, Literal::Seq(items)) => {
                            items.iter().map(Literal::to_value).collect()
                        }
                        (CmpOp::In, _) | (CmpOp::Nin, _) => {
                            return Err(ViewstreamError::PredicateCompile(format!(
                                "'{op_str}' requires a sequence argument"
                            )))
                        }
                        _ => Vec::new(),
                    };
                    let is_bool_true = matches!(literal, Literal::Bool(true));
                    conjuncts.push(Comparison {
                        field: field.clone(),
                        op,
                        literal: literal.to_value(),
                        enum_ordinal: None,
                        seq,
                        is_bool_true,
                    });
                }
            }
            if conjuncts.len() == 1 {
                Ok(Node::Cmp(conjuncts.into_iter().next().unwrap()))
            } else {
                Ok(Node::And(
                    conjuncts.into_iter().map(Node::Cmp).collect(),
                ))
            }
        }
    }
}

/// Resolves enum ordinal tables for every enum-typed comparison in a
/// compiled predicate. Split from `compile` because the enum registry lives
/// on `Schema`, not on a single `ViewDefinition`.
pub fn resolve_enum_ordinals(
    predicate: &mut Predicate,
    view: &ViewDefinition,
    enums: &std::collections::HashMap<String, crate::schema::EnumType>,
) {
    resolve_node(&mut predicate.root, view, enums);
}

fn resolve_node(
    node: &mut Node,
    view: &ViewDefinition,
    enums: &std::collections::HashMap<String, crate::schema::EnumType>,
) {
    match node {
        Node::And(children) | Node::Or(children) => {
            for c in children {
                resolve_node(c, view, enums);
            }
        }
        Node::Not(child) => resolve_node(child, view, enums),
        Node::Cmp(cmp) => {
            if !matches!(cmp.op, CmpOp::Gt | CmpOp::Gte | CmpOp::Lt | CmpOp::Lte) {
                return;
            }
            let Some(DataType::Enum(enum_name)) = view.field(&cmp.field).map(|f| &f.data_type)
            else {
                return;
            };
            let Some(enum_type) = enums.get(enum_name) else {
                return;
            };
            let literal_str = cmp.literal.as_str();
            let literal_ord = literal_str.and_then(|s| enum_type.ordinal_of(s));
            cmp.enum_ordinal = Some(literal_ord);
        }
    }
}

/// Wraps a predicate tree in `_not`. Used to build the default `unmatch`
/// half of a `view::Filter` when a caller supplies only a `match` predicate
/// (spec.md §9 Open Question (c): omitted `unmatch`/`clear` defaults to the
/// negation of `match`/`fire`).
pub fn negate_tree(tree: PredicateNode) -> PredicateNode {
    PredicateNode::Not {
        not: Box::new(tree),
    }
}

/// Convenience: compiles and resolves enum ordinals in one call — what
/// `view::View::new` and the Trigger Engine actually call.
pub fn compile_for_view(
    tree: &PredicateNode,
    view: &ViewDefinition,
    enums: &std::collections::HashMap<String, crate::schema::EnumType>,
) -> Result<Predicate> {
    let mut predicate = compile(tree, view)?;
    resolve_enum_ordinals(&mut predicate, view, enums);
    Ok(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumType, FieldDef};
    use std::collections::HashMap;

    fn priority_view() -> (ViewDefinition, HashMap<String, EnumType>) {
        let view = ViewDefinition {
            name: "items".to_string(),
            primary_key_field: "pk".to_string(),
            fields: vec![
                FieldDef {
                    name: "pk".to_string(),
                    data_type: DataType::Int,
                },
                FieldDef {
                    name: "priority".to_string(),
                    data_type: DataType::Enum("priority".to_string()),
                },
            ],
        };
        let mut enums = HashMap::new();
        enums.insert(
            "priority".to_string(),
            EnumType {
                name: "priority".to_string(),
                values: vec!["low".to_string(), "medium".to_string(), "high".to_string()],
            },
        );
        (view, enums)
    }

    fn row_with_priority(pk: i64, priority: &str) -> Row {
        let ordinal = ["low", "medium", "high"]
            .iter()
            .position(|v| *v == priority)
            .expect("test helper only used with known priority values");
        let mut r = Row::new();
        r.insert("pk".to_string(), Value::Int(pk));
        r.insert(
            "priority".to_string(),
            Value::Enum { value: priority.to_string(), ordinal },
        );
        r
    }

    #[test]
    fn enum_ordinal_comparison() {
        let (view, enums) = priority_view();
        let json = r#"{"priority": {"_gt": "medium"}}"#;
        let tree: PredicateNode = serde_json::from_str(json).unwrap();
        let pred = compile_for_view(&tree, &view, &enums).unwrap();

        assert!(pred.evaluate(&row_with_priority(1, "high")));
        assert!(!pred.evaluate(&row_with_priority(2, "low")));
        assert!(!pred.evaluate(&row_with_priority(3, "medium")));
        assert_eq!(pred.fields().len(), 1);
        assert!(pred.fields().contains("priority"));
    }

    #[test]
    fn enum_literal_not_in_enum_is_false_for_ordinal_ops() {
        let (view, enums) = priority_view();
        let json = r#"{"priority": {"_gt": "extreme"}}"#;
        let tree: PredicateNode = serde_json::from_str(json).unwrap();
        let pred = compile_for_view(&tree, &view, &enums).unwrap();
        assert!(!pred.evaluate(&row_with_priority(1, "high")));
    }

    #[test]
    fn and_or_not_precedence() {
        let (view, enums) = priority_view();
        let json = r#"{"_and": [{"pk": {"_gt": 0}}, {"_not": {"priority": {"_eq": "low"}}}]}"#;
        let tree: PredicateNode = serde_json::from_str(json).unwrap();
        let pred = compile_for_view(&tree, &view, &enums).unwrap();
        assert!(pred.evaluate(&row_with_priority(1, "high")));
        assert!(!pred.evaluate(&row_with_priority(1, "low")));
        assert!(!pred.evaluate(&row_with_priority(-1, "high")));
    }

    #[test]
    fn in_requires_sequence() {
        let view = priority_view().0;
        let json = r#"{"pk": {"_in": 5}}"#;
        let tree: PredicateNode = serde_json::from_str(json).unwrap();
        assert!(compile(&tree, &view).is_err());
    }

    #[test]
    fn empty_tree_is_an_error() {
        let view = priority_view().0;
        let json = r#"{}"#;
        let tree: PredicateNode = serde_json::from_str(json).unwrap();
        assert!(compile(&tree, &view).is_err());
    }

    #[test]
    fn is_null_true_matches_null_only() {
        let view = priority_view().0;
        let json = r#"{"priority": {"_is_null": true}}"#;
        let tree: PredicateNode = serde_json::from_str(json).unwrap();
        let pred = compile(&tree, &view).unwrap();
        let mut null_row = Row::new();
        null_row.insert("pk".to_string(), Value::Int(1));
        assert!(pred.evaluate(&null_row));
        assert!(!pred.evaluate(&row_with_priority(1, "low")));
    }
}
