//! Hash joins over in-memory tables.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tablecore::{Cell, Column, EngineError, Table};

/// Suffix for right-hand columns whose name is already taken on the left
pub const RIGHT_SUFFIX: &str = "_right";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

impl FromStr for JoinType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "full" | "outer" => Ok(JoinType::Full),
            "semi" => Ok(JoinType::Semi),
            "anti" => Ok(JoinType::Anti),
            "cross" => Ok(JoinType::Cross),
            other => Err(EngineError::UnsupportedJoin(other.to_string())),
        }
    }
}

impl JoinType {
    pub fn requires_keys(self) -> bool {
        self != JoinType::Cross
    }

    /// Only left columns are kept
    fn filters_left(self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// Hashable form of a non-null key cell. Floats hash by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

fn row_key(columns: &[&Column], row: usize) -> Option<Vec<KeyPart>> {
    columns
        .iter()
        .map(|c| match &c.values[row] {
            Cell::Null => None,
            Cell::Bool(b) => Some(KeyPart::Bool(*b)),
            Cell::Int(n) => Some(KeyPart::Int(*n)),
            Cell::Float(f) => Some(KeyPart::Float(f.to_bits())),
            Cell::Str(s) => Some(KeyPart::Str(s.clone())),
        })
        .collect()
}

fn lookup<'a>(
    index: &'a HashMap<Vec<KeyPart>, Vec<usize>>,
    columns: &[&Column],
    row: usize,
) -> &'a [usize] {
    row_key(columns, row)
        .and_then(|key| index.get(&key))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn key_columns<'a>(
    table: &'a Table,
    on: &[String],
    side: &str,
) -> Result<Vec<&'a Column>, EngineError> {
    on.iter()
        .map(|key| {
            table
                .column(key)
                .ok_or_else(|| EngineError::ColumnNotFound(format!("{} ({} table)", key, side)))
        })
        .collect()
}

pub(crate) fn join(
    left: &Table,
    right: &Table,
    on: &[String],
    how: JoinType,
) -> Result<Table, EngineError> {
    if how == JoinType::Cross {
        return Ok(cross(left, right));
    }
    if on.is_empty() {
        return Err(EngineError::UnsupportedJoin(format!(
            "{:?} join without keys",
            how
        )));
    }

    let left_keys = key_columns(left, on, "left")?;
    let right_keys = key_columns(right, on, "right")?;
    for (l, r) in left_keys.iter().zip(&right_keys) {
        if l.dtype != r.dtype {
            return Err(EngineError::IncompatibleKeys {
                key: l.name.clone(),
                left: l.dtype.to_string(),
                right: r.dtype.to_string(),
            });
        }
    }

    let mut index: HashMap<Vec<KeyPart>, Vec<usize>> = HashMap::new();
    for row in 0..right.height() {
        if let Some(key) = row_key(&right_keys, row) {
            index.entry(key).or_default().push(row);
        }
    }

    let matches_of = |row: usize| lookup(&index, &left_keys, row);

    let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
    match how {
        JoinType::Semi | JoinType::Anti => {
            let keep_matched = how == JoinType::Semi;
            for l in 0..left.height() {
                if matches_of(l).is_empty() != keep_matched {
                    pairs.push((Some(l), None));
                }
            }
        }
        JoinType::Right => {
            let mut by_right: Vec<Vec<usize>> = vec![Vec::new(); right.height()];
            for l in 0..left.height() {
                for &r in matches_of(l) {
                    by_right[r].push(l);
                }
            }
            for (r, lefts) in by_right.into_iter().enumerate() {
                if lefts.is_empty() {
                    pairs.push((None, Some(r)));
                }
                pairs.extend(lefts.into_iter().map(|l| (Some(l), Some(r))));
            }
        }
        JoinType::Inner | JoinType::Left | JoinType::Full => {
            let mut matched_right = HashSet::new();
            for l in 0..left.height() {
                let found = matches_of(l);
                if found.is_empty() && how != JoinType::Inner {
                    pairs.push((Some(l), None));
                }
                for &r in found {
                    matched_right.insert(r);
                    pairs.push((Some(l), Some(r)));
                }
            }
            if how == JoinType::Full {
                pairs.extend(
                    (0..right.height())
                        .filter(|r| !matched_right.contains(r))
                        .map(|r| (None, Some(r))),
                );
            }
        }
        JoinType::Cross => unreachable!("cross joins return early"),
    }

    Ok(assemble(left, right, on, how, &pairs))
}

fn pick(column: &Column, row: Option<usize>) -> Cell {
    row.map(|r| column.values[r].clone()).unwrap_or(Cell::Null)
}

fn assemble(
    left: &Table,
    right: &Table,
    on: &[String],
    how: JoinType,
    pairs: &[(Option<usize>, Option<usize>)],
) -> Table {
    let mut columns = Vec::new();

    for col in &left.columns {
        let values = if on.contains(&col.name) {
            let right_col = right.column(&col.name);
            pairs
                .iter()
                .map(|&(l, r)| {
                    let from_left = pick(col, l);
                    match (how, right_col) {
                        (JoinType::Right, Some(rc)) => pick(rc, r),
                        (JoinType::Full, Some(rc)) if from_left.is_null() => pick(rc, r),
                        _ => from_left,
                    }
                })
                .collect()
        } else {
            pairs.iter().map(|&(l, _)| pick(col, l)).collect()
        };
        columns.push(Column::new(col.name.clone(), col.dtype, values));
    }

    if !how.filters_left() {
        let mut taken: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        for col in &right.columns {
            if on.contains(&col.name) {
                continue;
            }
            columns.push(Column::new(
                right_name(&mut taken, &col.name),
                col.dtype,
                pairs.iter().map(|&(_, r)| pick(col, r)).collect(),
            ));
        }
    }

    Table::new(columns)
}

/// Output name for a right-hand column, suffixed until it is unique.
fn right_name(taken: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = name.to_string();
    while taken.contains(&candidate) {
        candidate.push_str(RIGHT_SUFFIX);
    }
    taken.insert(candidate.clone());
    candidate
}

fn cross(left: &Table, right: &Table) -> Table {
    let pairs: Vec<(Option<usize>, Option<usize>)> = (0..left.height())
        .flat_map(|l| (0..right.height()).map(move |r| (Some(l), Some(r))))
        .collect();

    let mut columns: Vec<Column> = left
        .columns
        .iter()
        .map(|c| {
            let values = pairs.iter().map(|&(l, _)| pick(c, l)).collect();
            Column::new(c.name.clone(), c.dtype, values)
        })
        .collect();
    let mut taken: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
    columns.extend(right.columns.iter().map(|c| {
        let values = pairs.iter().map(|&(_, r)| pick(c, r)).collect();
        Column::new(right_name(&mut taken, &c.name), c.dtype, values)
    }));

    Table::new(columns)
}
