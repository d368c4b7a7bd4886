//! # Rate Table Loading
//!
//! The decomposers only accept equal-length, index-aligned numeric vectors.
//! This module is the boundary where tabular input (TSV) becomes such vectors:
//!
//! - Rows are split by an optional group column (e.g. sex or region), keeping
//!   groups in order of first appearance.
//! - Within a group the ordering column (e.g. age) must be strictly
//!   increasing. Rows are never reordered silently.
//! - Missing or NaN rate cells are replaced by 0. This is the only place
//!   missing data is filled, and every substitution is counted and logged.
//!
//! Reading goes through the `polars` CSV reader.

use ndarray::Array1;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Column names to extract from the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Optional grouping key; without it the whole file is one group.
    pub group: Option<String>,
    /// Ordering column shared by both rate vectors, e.g. age.
    pub index: String,
    /// Rates for the first state (θ₁).
    pub from: String,
    /// Rates for the second state (θ₂).
    pub to: String,
}

/// Aligned rate vectors for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRates {
    pub group: String,
    pub index: Array1<f64>,
    pub from: Array1<f64>,
    pub to: Array1<f64>,
}

/// Group label used when no group column is given.
pub const SINGLE_GROUP: &str = "all";

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to numbers. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        found_type: String,
    },
    #[error("Missing values were found in the column '{0}', which may not have gaps.")]
    MissingValuesFound(String),
    #[error(
        "Rows of group '{group}' are not sorted: index value {value} at row {row} does not increase on the previous row."
    )]
    UnsortedIndex { group: String, row: usize, value: f64 },
    #[error("The input file contains no data rows.")]
    EmptyInput,
}

/// Loads aligned rate vectors, one entry per group, from a tab-separated file.
pub fn load_rate_table(
    path: impl AsRef<Path>,
    columns: &ColumnSpec,
) -> Result<Vec<GroupRates>, DataError> {
    let path = path.as_ref();
    log::info!("Loading rate table from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::EmptyInput);
    }

    let present: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let required = columns
        .group
        .iter()
        .chain([&columns.index, &columns.from, &columns.to]);
    for name in required {
        if !present.contains(name) {
            return Err(DataError::ColumnNotFound(name.clone()));
        }
    }

    let index = internal::complete_numeric_column(&df, &columns.index)?;
    let from = internal::filled_rate_column(&df, &columns.from)?;
    let to = internal::filled_rate_column(&df, &columns.to)?;
    let labels = match &columns.group {
        Some(name) => internal::label_column(&df, name)?,
        None => vec![SINGLE_GROUP.to_string(); df.height()],
    };

    let groups = internal::split_by_group(&labels, &index, &from, &to)?;
    log::info!(
        "Loaded {} group(s) from {} rows.",
        groups.len(),
        df.height()
    );
    Ok(groups)
}

mod internal {
    use super::*;

    fn as_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
        let column = df.column(name)?;
        let casted = column
            .cast(&DataType::Float64)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: name.to_string(),
                found_type: format!("{:?}", column.dtype()),
            })?;
        // A strict cast that introduced nulls means non-numeric text.
        if casted.null_count() > column.null_count() {
            return Err(DataError::ColumnWrongType {
                column_name: name.to_string(),
                found_type: format!("{:?}", column.dtype()),
            });
        }
        Ok(casted.f64()?.into_iter().collect())
    }

    pub(super) fn complete_numeric_column(
        df: &DataFrame,
        name: &str,
    ) -> Result<Vec<f64>, DataError> {
        as_f64(df, name)?
            .into_iter()
            .map(|value| match value {
                Some(v) if !v.is_nan() => Ok(v),
                _ => Err(DataError::MissingValuesFound(name.to_string())),
            })
            .collect()
    }

    /// Rates with missing cells replaced by 0.
    pub(super) fn filled_rate_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
        let raw = as_f64(df, name)?;
        let mut substituted = 0usize;
        let filled = raw
            .into_iter()
            .map(|value| match value {
                Some(v) if !v.is_nan() => v,
                _ => {
                    substituted += 1;
                    0.0
                }
            })
            .collect();
        if substituted > 0 {
            log::warn!("Column '{name}': {substituted} missing rate value(s) replaced by 0.");
        }
        Ok(filled)
    }

    pub(super) fn label_column(df: &DataFrame, name: &str) -> Result<Vec<String>, DataError> {
        let column = df.column(name)?;
        if column.null_count() > 0 {
            return Err(DataError::MissingValuesFound(name.to_string()));
        }
        let casted = column.cast(&DataType::String)?;
        Ok(casted
            .str()?
            .into_iter()
            .map(|label| label.unwrap_or_default().to_string())
            .collect())
    }

    pub(super) fn split_by_group(
        labels: &[String],
        index: &[f64],
        from: &[f64],
        to: &[f64],
    ) -> Result<Vec<GroupRates>, DataError> {
        let mut order: Vec<(String, Vec<usize>)> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        for (row, label) in labels.iter().enumerate() {
            let slot = *position.entry(label.as_str()).or_insert_with(|| {
                order.push((label.clone(), Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(row);
        }

        order
            .into_iter()
            .map(|(group, rows)| {
                for pair in rows.windows(2) {
                    if index[pair[1]] <= index[pair[0]] {
                        return Err(DataError::UnsortedIndex {
                            group,
                            row: pair[1] + 1,
                            value: index[pair[1]],
                        });
                    }
                }
                Ok(GroupRates {
                    group,
                    index: rows.iter().map(|&r| index[r]).collect(),
                    from: rows.iter().map(|&r| from[r]).collect(),
                    to: rows.iter().map(|&r| to[r]).collect(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn spec(group: Option<&str>) -> ColumnSpec {
        ColumnSpec {
            group: group.map(str::to_string),
            index: "age".to_string(),
            from: "mx1".to_string(),
            to: "mx2".to_string(),
        }
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let file = write_table(
            "sex\tage\tmx1\tmx2\n\
             m\t0\t0.02\t0.01\n\
             f\t0\t0.01\t0.008\n\
             m\t1\t0.03\t0.02\n\
             f\t1\t0.02\t0.01\n",
        );
        let groups = load_rate_table(file.path(), &spec(Some("sex"))).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group, "m");
        assert_eq!(groups[0].from, array![0.02, 0.03]);
        assert_eq!(groups[1].group, "f");
        assert_eq!(groups[1].to, array![0.008, 0.01]);
    }

    #[test]
    fn missing_rates_become_zero() {
        let file = write_table("age\tmx1\tmx2\n0\t0.02\t\n1\t\t0.01\n");
        let groups = load_rate_table(file.path(), &spec(None)).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group, SINGLE_GROUP);
        assert_eq!(groups[0].from, array![0.02, 0.0]);
        assert_eq!(groups[0].to, array![0.0, 0.01]);
    }

    #[test]
    fn unsorted_index_is_rejected() {
        let file = write_table("age\tmx1\tmx2\n1\t0.02\t0.01\n0\t0.01\t0.01\n");
        assert!(matches!(
            load_rate_table(file.path(), &spec(None)),
            Err(DataError::UnsortedIndex { row: 2, .. })
        ));
    }

    #[test]
    fn missing_column_is_named() {
        let file = write_table("age\tmx1\n0\t0.02\n");
        match load_rate_table(file.path(), &spec(None)) {
            Err(DataError::ColumnNotFound(name)) => assert_eq!(name, "mx2"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
