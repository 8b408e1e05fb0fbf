//! The extraction pipeline language.
//!
//! A [`Program`] is a flat list of [`Step`]s applied in order to the rows of
//! one sheet. Row steps narrow or reshape the working rows; at most one
//! terminal step, always last, turns them into the result. Programs have no
//! loops, no I/O and no access to anything but `rows` and `headers`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, SheetQueryError};
use crate::grid::Comparison;

/// A column addressed by 0-based index or by header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{}", i),
            ColumnRef::Name(n) => write!(f, "'{}'", n),
        }
    }
}

/// Target type of a `coerce` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoerceTo {
    Number,
    Text,
    Boolean,
}

/// Function of an `aggregate` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Sum,
    #[serde(alias = "average", alias = "mean")]
    Avg,
    Min,
    Max,
    Count,
}

/// One pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Keep rows `[start, end)`.
    Slice {
        start: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<usize>,
    },
    /// Drop rows with no values.
    DropBlank,
    /// Keep rows with a value in at least one of the columns.
    RequireAny { columns: Vec<ColumnRef> },
    Filter {
        column: ColumnRef,
        #[serde(deserialize_with = "comparison")]
        operator: Comparison,
        #[serde(default)]
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<Value>,
    },
    Coerce { column: ColumnRef, to: CoerceTo },
    Sort {
        column: ColumnRef,
        #[serde(default)]
        descending: bool,
    },
    Limit { count: usize },
    /// Terminal: records of the listed columns (all columns when empty).
    Project {
        #[serde(default)]
        columns: Vec<ColumnRef>,
    },
    /// Terminal: `{key: {count, total}}` summing the listed columns.
    Group {
        key: ColumnRef,
        #[serde(default)]
        sum: Vec<ColumnRef>,
    },
    /// Terminal: one scalar.
    Aggregate {
        function: AggregateFn,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<ColumnRef>,
    },
    /// Terminal: unique values of a column in first-seen order.
    Distinct { column: ColumnRef },
    /// Terminal: number of remaining rows.
    Count,
}

impl Step {
    /// Whether the step produces the final result.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Step::Project { .. }
                | Step::Group { .. }
                | Step::Aggregate { .. }
                | Step::Distinct { .. }
                | Step::Count
        )
    }

    /// Name of the step as written in a program.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Slice { .. } => "slice",
            Step::DropBlank => "drop_blank",
            Step::RequireAny { .. } => "require_any",
            Step::Filter { .. } => "filter",
            Step::Coerce { .. } => "coerce",
            Step::Sort { .. } => "sort",
            Step::Limit { .. } => "limit",
            Step::Project { .. } => "project",
            Step::Group { .. } => "group",
            Step::Aggregate { .. } => "aggregate",
            Step::Distinct { .. } => "distinct",
            Step::Count => "count",
        }
    }
}

/// Accept operator symbols and words alike (`>=`, `gte`).
fn comparison<'de, D>(deserializer: D) -> std::result::Result<Comparison, D::Error>
where
    D: Deserializer<'de>,
{
    let token = String::deserialize(deserializer)?;
    Comparison::parse(&token)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown operator '{}'", token)))
}

/// Shape of a program's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Array of `{header: value}` records.
    Records,
    /// Object keyed by group value.
    Grouped,
    /// A single number.
    Scalar,
    /// Array of plain values.
    Values,
}

/// An extraction procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    steps: Vec<Step>,
}

impl Program {
    /// Build a program, rejecting misplaced terminal steps.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let program = Self { steps };
        program.validate()?;
        Ok(program)
    }

    /// Parse a JSON step array.
    pub fn from_json(value: &Value) -> Result<Self> {
        let steps: Vec<Step> = serde_json::from_value(value.clone())
            .map_err(|e| SheetQueryError::Malformed(format!("invalid procedure: {}", e)))?;
        Self::new(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check that at most one terminal step exists and that it comes last.
    pub fn validate(&self) -> Result<()> {
        if let Some(pos) = self.steps.iter().position(Step::is_terminal) {
            if pos + 1 != self.steps.len() {
                return Err(SheetQueryError::Malformed(format!(
                    "step {} ('{}') must be the last step",
                    pos,
                    self.steps[pos].name()
                )));
            }
        }
        Ok(())
    }

    /// Same program with fully blank rows dropped right after slicing.
    ///
    /// Programs that already drop blank rows are returned unchanged.
    pub fn without_blank_rows(mut self) -> Self {
        if !self.steps.contains(&Step::DropBlank) {
            let at = self
                .steps
                .iter()
                .take_while(|s| matches!(s, Step::Slice { .. }))
                .count();
            self.steps.insert(at, Step::DropBlank);
        }
        self
    }

    /// Shape of the value this program produces.
    pub fn output_shape(&self) -> OutputShape {
        match self.steps.last() {
            Some(Step::Group { .. }) => OutputShape::Grouped,
            Some(Step::Aggregate { .. }) | Some(Step::Count) => OutputShape::Scalar,
            Some(Step::Distinct { .. }) => OutputShape::Values,
            _ => OutputShape::Records,
        }
    }
}
