//! CSV ingestion with per-column type inference.

use std::path::Path;
use tablecore::{Cell, Column, DataType, EngineError, ReadOptions, Table};

pub(crate) fn read_csv(path: &Path, options: &ReadOptions) -> Result<Table, EngineError> {
    let source_err = |message: String| EngineError::Source {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(options.ignore_errors)
        .from_path(path)
        .map_err(|e| source_err(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| source_err(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) if options.ignore_errors => {
                tracing::debug!("Skipping record {} of {}: {}", line + 1, path.display(), e);
                continue;
            }
            Err(e) => return Err(source_err(e.to_string())),
        };

        for (idx, column) in raw.iter_mut().enumerate() {
            let field = record.get(idx).filter(|f| !f.is_empty());
            column.push(field.map(str::to_string));
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (name, values) in headers.into_iter().zip(raw) {
        let dtype = infer_dtype(&values, options.infer_schema_length);
        let mut cells = Vec::with_capacity(values.len());
        for value in values {
            let cell = match value {
                None => Cell::Null,
                Some(text) => match parse_cell(&text, dtype) {
                    Some(cell) => cell,
                    None if options.ignore_errors => Cell::Null,
                    None => {
                        return Err(source_err(format!(
                            "cannot parse '{}' as {} in column '{}'",
                            text, dtype, name
                        )))
                    }
                },
            };
            cells.push(cell);
        }
        columns.push(Column::new(name, dtype, cells));
    }

    Ok(Table::new(columns))
}

/// Narrowest type accepting every non-empty value in the first `window` rows.
fn infer_dtype(values: &[Option<String>], window: usize) -> DataType {
    let sample: Vec<&str> = values
        .iter()
        .take(window)
        .filter_map(|v| v.as_deref())
        .collect();

    if sample.is_empty() {
        return DataType::Str;
    }

    [DataType::Int, DataType::Float, DataType::Bool]
        .into_iter()
        .find(|&dtype| sample.iter().all(|v| parse_cell(v, dtype).is_some()))
        .unwrap_or(DataType::Str)
}

fn parse_cell(text: &str, dtype: DataType) -> Option<Cell> {
    let text = text.trim();
    match dtype {
        DataType::Int => text.parse::<i64>().ok().map(Cell::Int),
        // `f64::from_str` also accepts "nan" and "inf"; those stay text.
        DataType::Float => text
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Cell::Float),
        DataType::Bool => match text.to_ascii_lowercase().as_str() {
            "true" => Some(Cell::Bool(true)),
            "false" => Some(Cell::Bool(false)),
            _ => None,
        },
        DataType::Str => Some(Cell::Str(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("input.csv");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_infers_column_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "id,price,active,name\n1,2.5,true,Oslo\n2,3,FALSE,\n,4.25,true,Lima\n",
        );

        let table = read_csv(&path, &ReadOptions::default()).unwrap();
        let dtypes: Vec<DataType> = table.columns.iter().map(|c| c.dtype).collect();
        assert_eq!(
            dtypes,
            vec![DataType::Int, DataType::Float, DataType::Bool, DataType::Str]
        );
        assert_eq!(table.height(), 3);
        assert_eq!(table.columns[0].values[2], Cell::Null);
        assert_eq!(table.columns[1].values[1], Cell::Float(3.0));
        assert_eq!(table.columns[3].values[1], Cell::Null);
    }

    #[test]
    fn test_values_outside_window_become_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "n\n1\n2\nabc\n");
        let options = ReadOptions {
            infer_schema_length: 2,
            ..ReadOptions::default()
        };

        let table = read_csv(&path, &options).unwrap();
        assert_eq!(table.columns[0].dtype, DataType::Int);
        assert_eq!(table.columns[0].values[2], Cell::Null);

        let strict = ReadOptions {
            ignore_errors: false,
            ..options
        };
        assert!(read_csv(&path, &strict).is_err());
    }

    #[test]
    fn test_short_rows_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a,b\n1,x\n2\n");

        let table = read_csv(&path, &ReadOptions::default()).unwrap();
        assert_eq!(table.columns[1].values, vec![Cell::from("x"), Cell::Null]);
    }

    #[test]
    fn test_non_finite_words_stay_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "id,v,name\n1,inf,Nan\n2,NaN,Inf\n3,1.5,infinity\n");

        let table = read_csv(&path, &ReadOptions::default()).unwrap();
        let v = table.column("v").unwrap();
        assert_eq!(v.dtype, DataType::Str);
        assert_eq!(
            v.values,
            vec![Cell::from("inf"), Cell::from("NaN"), Cell::from("1.5")]
        );
        let name = table.column("name").unwrap();
        assert_eq!(name.dtype, DataType::Str);
        assert_eq!(
            name.values,
            vec![Cell::from("Nan"), Cell::from("Inf"), Cell::from("infinity")]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = read_csv(Path::new("/nonexistent/input.csv"), &ReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Source { .. }));
    }
}
