use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    Str,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Str => "str",
        };
        f.write_str(name)
    }
}

/// A single value in a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(n) => Some(*n as f64),
            Cell::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Type of a non-null cell.
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(DataType::Bool),
            Cell::Int(_) => Some(DataType::Int),
            Cell::Float(_) => Some(DataType::Float),
            Cell::Str(_) => Some(DataType::Str),
        }
    }

    /// Orders two non-null cells of compatible types.
    ///
    /// Ints and floats compare numerically. Returns `None` for nulls,
    /// mismatched types and NaN.
    pub fn compare(&self, other: &Cell) -> Option<Ordering> {
        match (self, other) {
            (Cell::Int(a), Cell::Int(b)) => Some(a.cmp(b)),
            (Cell::Bool(a), Cell::Bool(b)) => Some(a.cmp(b)),
            (Cell::Str(a), Cell::Str(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Bool(b) => serde_json::Value::Bool(*b),
            Cell::Int(n) => serde_json::Value::from(*n),
            Cell::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Str(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Str(s)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Int(n)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Float(n)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: DataType,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: DataType, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Columnar in-memory frame. All columns have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Builds a new table from the given row indices, in order.
    pub fn take(&self, rows: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype,
                values: rows.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Table { columns }
    }

    pub fn head(&self, limit: usize) -> Table {
        let rows: Vec<usize> = (0..self.height().min(limit)).collect();
        self.take(&rows)
    }

    /// Row-oriented view used for previews.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        (0..self.height())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].to_json()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Table {
        Table::new(vec![
            Column::new(
                "store",
                DataType::Int,
                vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)],
            ),
            Column::new(
                "city",
                DataType::Str,
                vec![Cell::from("Oslo"), Cell::Null, Cell::from("Lima")],
            ),
        ])
    }

    #[test]
    fn test_head_and_records() {
        let table = sample();
        assert_eq!(table.height(), 3);
        assert_eq!(table.width(), 2);

        let head = table.head(2);
        assert_eq!(head.height(), 2);

        let records = head.to_records();
        assert_eq!(records[0]["store"], serde_json::json!(1));
        assert_eq!(records[1]["city"], serde_json::Value::Null);
    }

    #[test]
    fn test_head_beyond_height() {
        assert_eq!(sample().head(50).height(), 3);
        assert_eq!(Table::default().head(5).height(), 0);
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Cell::Int(2).compare(&Cell::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Cell::from("a").compare(&Cell::Int(1)), None);
        assert_eq!(Cell::Null.compare(&Cell::Null), None);
    }

    #[test]
    fn test_serde_keeps_int_and_float_apart() {
        let json = serde_json::to_string(&vec![Cell::Int(3), Cell::Float(3.5), Cell::Null])
            .expect("serialize");
        let back: Vec<Cell> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, vec![Cell::Int(3), Cell::Float(3.5), Cell::Null]);
    }
}
