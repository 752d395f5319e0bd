//! Secondary access paths tied to columns.

pub mod hash;

use crate::column::ColumnTx;
use crate::error::Result;
use crate::storage::PageId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TupleId = PageId;

/// A minimal, schema-typed bag of rows, shared by index scans and entity
/// reads. One column per name; rows line up positionally across `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recordset {
    pub columns: Vec<String>,
    pub tuple_ids: Vec<TupleId>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl Recordset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            tuple_ids: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, tid: TupleId, row: Vec<Option<Value>>) {
        self.tuple_ids.push(tid);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.tuple_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuple_ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

/// A boolean predicate over column values.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: ComparisonOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// The predicate is atomic on a single column when it is a leaf
    /// (`Compare`/`In`), which lets `Entity.Tx` drive a scan from that
    /// column's iterator.
    pub fn atomic_column(&self) -> Option<&str> {
        match self {
            Predicate::Compare { column, .. } | Predicate::In { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// Relative cost estimate a planner uses to choose between a scan and an
/// index lookup, compared by `Entity::best_index_for` across candidate indexes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    pub disk: f64,
    pub memory: f64,
    pub compute: f64,
}

impl Cost {
    pub const ZERO: Cost = Cost { disk: 0.0, memory: 0.0, compute: 0.0 };

    /// Scalar total used to rank candidate indexes; disk I/O dominates.
    pub fn total(&self) -> f64 {
        self.disk * 4.0 + self.memory + self.compute
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;
    fn add(self, rhs: Cost) -> Cost {
        Cost {
            disk: self.disk + rhs.disk,
            memory: self.memory + rhs.memory,
            compute: self.compute + rhs.compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Hash,
}

/// Incremental maintenance event fed to `Index::update`.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    Insert { tid: TupleId, value: Option<Value> },
    Update { tid: TupleId, old: Option<Value>, new: Option<Value> },
    Delete { tid: TupleId, old: Option<Value> },
}

/// A named secondary access path over one or more columns of an entity.
pub trait Index: Send + Sync {
    fn name(&self) -> &str;
    fn index_type(&self) -> IndexType;

    /// Input columns this index is built over.
    fn columns(&self) -> &[String];

    /// Columns this index can answer a projection from without a join back
    /// to the entity's other columns.
    fn produces(&self) -> &[String];

    fn can_process(&self, predicate: &Predicate) -> bool;
    fn cost(&self, predicate: &Predicate) -> Result<Cost>;
    fn filter(&self, predicate: &Predicate) -> Result<Recordset>;

    /// Clear and fully rebuild the index by scanning the driving column
    /// through the caller-supplied transaction.
    fn rebuild(&self, driving_column: &ColumnTx) -> Result<()>;

    /// Apply incremental maintenance events, e.g. from a committing
    /// `Entity.Tx`.
    fn update(&self, events: &[IndexEvent]) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Tuple-ids mapped to by one key: a single id for a unique index, several
/// for a non-unique one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupleIdSet {
    One(TupleId),
    Many(Vec<TupleId>),
}

impl TupleIdSet {
    pub fn as_slice(&self) -> Vec<TupleId> {
        match self {
            TupleIdSet::One(t) => vec![*t],
            TupleIdSet::Many(v) => v.clone(),
        }
    }
}

pub(crate) fn group_by_value(pairs: Vec<(Value, TupleId)>) -> HashMap<ValueKey, Vec<TupleId>> {
    let mut out: HashMap<ValueKey, Vec<TupleId>> = HashMap::new();
    for (value, tid) in pairs {
        out.entry(ValueKey(value)).or_default().push(tid);
    }
    out
}

/// `Value` has no total `Eq`/`Hash` (floats), but hash-index keys in
/// practice are hashable scalar/string columns; this wrapper derives
/// bit-exact equality/hash from the serialized form rather than requiring
/// every `Value` variant to implement `Hash`.
#[derive(Debug, Clone)]
pub struct ValueKey(pub Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.serialize() == other.0.serialize() && self.0.value_type() == other.0.value_type()
    }
}

impl Eq for ValueKey {}

impl std::hash::Hash for ValueKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.serialize().hash(state);
    }
}
