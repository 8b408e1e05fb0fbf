//! Interpreter for extraction programs.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{Result, SheetQueryError};
use crate::grid::{number_value, CellValue, Comparison};
use crate::matching::text::resolve_header;
use crate::plan::{AggregateFn, CoerceTo, ColumnRef, ExtractionPlan, Program, Step};
use crate::schema::column_letter;

use super::context::EvalContext;
use super::executor::Procedure;

static NULL: CellValue = CellValue::Null;

type Row<'a> = Cow<'a, [CellValue]>;

impl Procedure for Program {
    fn run(&self, ctx: &EvalContext) -> Result<Value> {
        run_program(self, ctx)
    }
}

impl Procedure for ExtractionPlan {
    fn run(&self, ctx: &EvalContext) -> Result<Value> {
        run_program(&self.procedure, ctx)
    }
}

/// Evaluate `program` over the context's rows.
pub fn run_program(program: &Program, ctx: &EvalContext) -> Result<Value> {
    program.validate()?;
    let mut interp = Interpreter::new(ctx);
    for step in program.steps() {
        ctx.checkpoint()?;
        if let Some(result) = interp.apply(step)? {
            return Ok(result);
        }
    }
    // No terminal step: every remaining row as a record.
    interp.project(&[])
}

struct Interpreter<'a> {
    ctx: &'a EvalContext,
    rows: Vec<Row<'a>>,
    width: usize,
}

impl<'a> Interpreter<'a> {
    fn new(ctx: &'a EvalContext) -> Self {
        let rows: Vec<Row<'a>> = ctx.rows().iter().map(|r| Cow::Borrowed(r.as_slice())).collect();
        let widest = ctx.rows().iter().map(Vec::len).max().unwrap_or(0);
        Self {
            ctx,
            rows,
            width: widest.max(ctx.headers().len()),
        }
    }

    /// Apply one step; terminal steps return the result.
    fn apply(&mut self, step: &Step) -> Result<Option<Value>> {
        match step {
            Step::Slice { start, end } => {
                let len = self.rows.len();
                let end = end.unwrap_or(len).min(len);
                let start = (*start).min(end);
                self.rows.truncate(end);
                self.rows.drain(..start);
            }
            Step::DropBlank => {
                let ctx = self.ctx;
                self.retain(|row| Ok(!ctx.is_blank_row(row)))?;
            }
            Step::RequireAny { columns } => {
                let columns = self.columns(columns)?;
                self.retain(|row| Ok(columns.iter().any(|c| !cell(row, *c).is_empty())))?;
            }
            Step::Filter {
                column,
                operator,
                value,
                upper,
            } => {
                let column = self.column(column)?;
                if *operator == Comparison::Between && upper.is_none() {
                    return Err(SheetQueryError::Execution(
                        "filter 'between' is missing its upper bound".to_string(),
                    ));
                }
                self.retain(|row| Ok(operator.evaluate(cell(row, column), value, upper.as_ref())))?;
            }
            Step::Coerce { column, to } => {
                let column = self.column(column)?;
                for row in &mut self.rows {
                    self.ctx.checkpoint()?;
                    let coerced = coerce(cell(row, column), *to);
                    let owned = row.to_mut();
                    if owned.len() <= column {
                        owned.resize(column + 1, CellValue::Null);
                    }
                    owned[column] = coerced;
                }
            }
            Step::Sort { column, descending } => {
                let column = self.column(column)?;
                self.rows.sort_by(|a, b| {
                    let (x, y) = (cell(a, column), cell(b, column));
                    // Blanks sort last in both directions.
                    match (x.is_empty(), y.is_empty()) {
                        (true, true) => Ordering::Equal,
                        (true, false) => Ordering::Greater,
                        (false, true) => Ordering::Less,
                        (false, false) => {
                            let order = compare_cells(x, y);
                            if *descending { order.reverse() } else { order }
                        }
                    }
                });
            }
            Step::Limit { count } => self.rows.truncate(*count),
            Step::Project { columns } => return self.project(columns).map(Some),
            Step::Group { key, sum } => return self.group(key, sum).map(Some),
            Step::Aggregate { function, column } => {
                return self.aggregate(*function, column.as_ref()).map(Some);
            }
            Step::Distinct { column } => return self.distinct(column).map(Some),
            Step::Count => return Ok(Some(Value::from(self.rows.len()))),
        }
        Ok(None)
    }

    fn retain<F>(&mut self, mut keep: F) -> Result<()>
    where
        F: FnMut(&[CellValue]) -> Result<bool>,
    {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            self.ctx.checkpoint()?;
            if keep(&row)? {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    /// Resolve a column reference to a position.
    fn column(&self, column: &ColumnRef) -> Result<usize> {
        match column {
            ColumnRef::Index(i) if *i < self.width => Ok(*i),
            ColumnRef::Index(i) => Err(SheetQueryError::Execution(format!(
                "column index {} out of range ({} columns)",
                i, self.width
            ))),
            ColumnRef::Name(name) => {
                let headers = self.ctx.headers();
                headers
                    .iter()
                    .position(|h| h.trim() == name.trim())
                    .or_else(|| resolve_header(headers, name))
                    .ok_or_else(|| {
                        SheetQueryError::Execution(format!(
                            "column '{}' is undefined; headers are [{}]",
                            name,
                            headers.join(", ")
                        ))
                    })
            }
        }
    }

    fn columns(&self, columns: &[ColumnRef]) -> Result<Vec<usize>> {
        columns.iter().map(|c| self.column(c)).collect()
    }

    /// Record key for a column: its header, else its letter.
    fn key_for(&self, column: usize) -> String {
        self.ctx
            .headers()
            .get(column)
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| column_letter(column))
    }

    fn project(&self, columns: &[ColumnRef]) -> Result<Value> {
        let positions = if columns.is_empty() {
            (0..self.width).collect()
        } else {
            self.columns(columns)?
        };

        let mut keys: Vec<String> = Vec::with_capacity(positions.len());
        for &position in &positions {
            let mut key = self.key_for(position);
            if keys.contains(&key) {
                key = format!("{} ({})", key, column_letter(position));
            }
            keys.push(key);
        }

        let mut records = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            self.ctx.checkpoint()?;
            let mut record = Map::new();
            for (key, &position) in keys.iter().zip(&positions) {
                record.insert(key.clone(), cell(row, position).to_json());
            }
            records.push(Value::Object(record));
        }
        Ok(Value::Array(records))
    }

    /// `{key: {count, total}}`; rows with a blank or missing key are skipped.
    fn group(&self, key: &ColumnRef, sum: &[ColumnRef]) -> Result<Value> {
        let key = self.column(key)?;
        let sum = self.columns(sum)?;

        let mut groups: IndexMap<String, (u64, f64)> = IndexMap::new();
        for row in &self.rows {
            self.ctx.checkpoint()?;
            if row.len() <= key || row[key].is_empty() {
                continue;
            }
            let entry = groups.entry(row[key].as_text().into_owned()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += sum
                .iter()
                .filter_map(|c| cell(row, *c).as_number())
                .sum::<f64>();
        }

        let mut out = Map::new();
        for (name, (count, total)) in groups {
            let total = finite(total, &format!("total for '{}'", name))?;
            let mut entry = Map::new();
            entry.insert("count".to_string(), Value::from(count));
            entry.insert("total".to_string(), total);
            out.insert(name, Value::Object(entry));
        }
        Ok(Value::Object(out))
    }

    fn aggregate(&self, function: AggregateFn, column: Option<&ColumnRef>) -> Result<Value> {
        let Some(column) = column else {
            return match function {
                AggregateFn::Count => Ok(Value::from(self.rows.len())),
                other => Err(SheetQueryError::Execution(format!(
                    "aggregate '{:?}' is missing its column",
                    other
                ))),
            };
        };
        let column = self.column(column)?;

        if function == AggregateFn::Count {
            let filled = self.rows.iter().filter(|r| !cell(r, column).is_empty()).count();
            return Ok(Value::from(filled));
        }

        let mut numbers = Vec::new();
        for row in &self.rows {
            self.ctx.checkpoint()?;
            if let Some(n) = cell(row, column).as_number() {
                numbers.push(n);
            }
        }

        let label = format!("{:?}", function).to_lowercase();
        let result = match function {
            AggregateFn::Sum => Some(numbers.iter().sum::<f64>()),
            AggregateFn::Avg => {
                (!numbers.is_empty()).then(|| numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
            AggregateFn::Min => numbers.iter().copied().reduce(f64::min),
            AggregateFn::Max => numbers.iter().copied().reduce(f64::max),
            AggregateFn::Count => None,
        };
        match result {
            Some(n) => finite(n, &label),
            None => Ok(Value::Null),
        }
    }

    fn distinct(&self, column: &ColumnRef) -> Result<Value> {
        let column = self.column(column)?;
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for row in &self.rows {
            self.ctx.checkpoint()?;
            let c = cell(row, column);
            if !c.is_empty() && seen.insert(c.as_text().to_lowercase()) {
                values.push(c.to_json());
            }
        }
        Ok(Value::Array(values))
    }
}

fn cell(row: &[CellValue], column: usize) -> &CellValue {
    row.get(column).unwrap_or(&NULL)
}

fn finite(n: f64, what: &str) -> Result<Value> {
    if n.is_finite() {
        Ok(number_value(n))
    } else {
        Err(SheetQueryError::Execution(format!(
            "{} is not a finite number and cannot be serialized",
            what
        )))
    }
}

fn coerce(cell: &CellValue, to: CoerceTo) -> CellValue {
    match to {
        CoerceTo::Number => cell.as_number().map_or(CellValue::Null, CellValue::Number),
        CoerceTo::Text if cell.is_empty() => CellValue::Null,
        CoerceTo::Text => CellValue::Text(cell.as_text().into_owned()),
        CoerceTo::Boolean => match cell {
            CellValue::Bool(b) => CellValue::Bool(*b),
            CellValue::Number(n) => CellValue::Bool(*n != 0.0),
            other => match other.as_text().to_lowercase().as_str() {
                "true" | "yes" | "y" | "si" | "sí" | "oui" | "ja" | "sim" | "да" | "是" => {
                    CellValue::Bool(true)
                }
                "false" | "no" | "n" | "non" | "nein" | "não" | "nao" | "нет" | "否" => {
                    CellValue::Bool(false)
                }
                _ => CellValue::Null,
            },
        },
    }
}

/// Numbers numerically, then dates, then case-insensitive text.
fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (a.as_date(), b.as_date()) {
        return x.cmp(&y);
    }
    a.as_text().to_lowercase().cmp(&b.as_text().to_lowercase())
}
