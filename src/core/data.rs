//! Purpose: Host-owned copies of decoded result buffers and their row
//! projection.
//! Exports: `DataSet`, `Table`, `Rows`, `Row`.
//! Role: Everything here is independent of foreign memory; instances outlive
//! the query call that produced them.
//! Invariants: `values.len() == codes.len() * indicators.len() * dates.len()`
//! for a `DataSet`, `rows * columns` for a `Table`.
//! Invariants: Dropping a set returns its values to the pool; callers never
//! see a partially recycled instance.
use std::collections::HashMap;

use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::{date, format_description};

use crate::core::error::{DimMismatch, Error, ErrorKind};
use crate::core::pool::VALUE_POOL;
use crate::core::value::Value;

const ROW_DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]/[month]/[day]");

/// Calendar date yielded for malformed row-date text.
pub const ZERO_DATE: Date = date!(0001 - 01 - 01);

/// Decoded serial result: codes, indicator names, date texts, and a dense
/// value array packed date-major, then code, indicator fastest-varying.
#[derive(Debug)]
pub struct DataSet {
    codes: Vec<String>,
    indicators: Vec<String>,
    dates: Vec<String>,
    values: Vec<Value>,
}

impl DataSet {
    /// Build a set from host-owned parts, enforcing the dense-packing
    /// invariant. The decoder bypasses this via `assemble` because it has
    /// already validated the foreign dimensions.
    pub fn from_parts(
        codes: Vec<String>,
        indicators: Vec<String>,
        dates: Vec<String>,
        values: Vec<Value>,
    ) -> Result<Self, Error> {
        let expected = codes.len() * indicators.len() * dates.len();
        if values.len() != expected {
            return Err(Error::new(ErrorKind::LengthMismatch)
                .with_message("value count does not match dimensions")
                .with_dims(DimMismatch::Cube {
                    values: values.len() as u64,
                    codes: codes.len() as u64,
                    indicators: indicators.len() as u64,
                    dates: dates.len() as u64,
                }));
        }
        Ok(Self::assemble(codes, indicators, dates, values))
    }

    pub(crate) fn assemble(
        codes: Vec<String>,
        indicators: Vec<String>,
        dates: Vec<String>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            codes,
            indicators,
            dates,
            values,
        }
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `(date, code, indicator)` position, if all indices are in
    /// range.
    pub fn value_at(&self, date_idx: usize, code_idx: usize, ind_idx: usize) -> Option<&Value> {
        if date_idx >= self.dates.len()
            || code_idx >= self.codes.len()
            || ind_idx >= self.indicators.len()
        {
            return None;
        }
        let n_ind = self.indicators.len();
        let index = n_ind * self.codes.len() * date_idx + n_ind * code_idx + ind_idx;
        self.values.get(index)
    }

    /// Lazy sequence of per-(date, code) indicator rows, dates outermost.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            data: self,
            date_idx: 0,
            code_idx: 0,
        }
    }
}

impl Drop for DataSet {
    fn drop(&mut self) {
        VALUE_POOL.release_all(&mut self.values);
    }
}

/// Decoded report result: a plain rows-by-columns grid with column
/// indicator names.
#[derive(Debug)]
pub struct Table {
    rows: usize,
    columns: usize,
    indicators: Vec<String>,
    values: Vec<Value>,
}

impl Table {
    pub fn from_parts(
        rows: usize,
        columns: usize,
        indicators: Vec<String>,
        values: Vec<Value>,
    ) -> Result<Self, Error> {
        if values.len() != rows * columns {
            return Err(Error::new(ErrorKind::LengthMismatch)
                .with_message("value count does not match grid")
                .with_dims(DimMismatch::Table {
                    values: values.len() as u64,
                    rows: rows as u64,
                    columns: columns as u64,
                }));
        }
        Ok(Self::assemble(rows, columns, indicators, values))
    }

    pub(crate) fn assemble(
        rows: usize,
        columns: usize,
        indicators: Vec<String>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            rows,
            columns,
            indicators,
            values,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value_at(&self, row: usize, column: usize) -> Option<&Value> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.values.get(row * self.columns + column)
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        VALUE_POOL.release_all(&mut self.values);
    }
}

/// Iterator over per-(date, code) rows of a `DataSet`.
pub struct Rows<'a> {
    data: &'a DataSet,
    date_idx: usize,
    code_idx: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.date_idx >= self.data.dates.len() || self.data.codes.is_empty() {
            return None;
        }
        let date_idx = self.date_idx;
        let code_idx = self.code_idx;

        self.code_idx += 1;
        if self.code_idx >= self.data.codes.len() {
            self.code_idx = 0;
            self.date_idx += 1;
        }

        let n_ind = self.data.indicators.len();
        let base = n_ind * (self.data.codes.len() * date_idx + code_idx);
        // Each row owns its own map so it stays valid independently of
        // iterator advancement.
        let mut values = HashMap::with_capacity(n_ind);
        for (ind_idx, name) in self.data.indicators.iter().enumerate() {
            values.insert(name.as_str(), &self.data.values[base + ind_idx]);
        }

        Some(Row {
            code: self.data.codes[code_idx].as_str(),
            date: parse_row_date(&self.data.dates[date_idx]),
            values,
        })
    }
}

/// One (date, code) projection exposing indicator-name lookup. Borrows the
/// set's shared name list; never copies it.
#[derive(Debug)]
pub struct Row<'a> {
    code: &'a str,
    date: Date,
    values: HashMap<&'a str, &'a Value>,
}

impl<'a> Row<'a> {
    pub fn code(&self) -> &'a str {
        self.code
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn get(&self, indicator: &str) -> Option<&'a Value> {
        self.values.get(indicator).copied()
    }

    pub fn indicator_count(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }
}

fn parse_row_date(text: &str) -> Date {
    match Date::parse(text, ROW_DATE_FORMAT) {
        Ok(date) => date,
        Err(err) => {
            tracing::error!(date = text, error = %err, "malformed row date");
            ZERO_DATE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSet, Table, ZERO_DATE, parse_row_date};
    use crate::core::error::{DimMismatch, ErrorKind};
    use crate::core::value::{Value, ValueKind};
    use time::macros::date;

    fn doubles(values: &[f64]) -> Vec<Value> {
        values
            .iter()
            .map(|v| {
                let mut value = Value::default();
                value.fill_raw(ValueKind::Double, v.to_le_bytes());
                value
            })
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rows_follow_date_then_code_then_indicator_order() {
        let set = DataSet::from_parts(
            strings(&["A", "B"]),
            strings(&["X", "Y"]),
            strings(&["2024/01/01"]),
            doubles(&[0.0, 1.0, 2.0, 3.0]),
        )
        .expect("data set");

        let rows: Vec<_> = set.rows().collect();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].code(), "A");
        assert_eq!(rows[0].date(), date!(2024 - 01 - 01));
        assert_eq!(rows[0].get("X").expect("X").as_f64(), 0.0);
        assert_eq!(rows[0].get("Y").expect("Y").as_f64(), 1.0);

        assert_eq!(rows[1].code(), "B");
        assert_eq!(rows[1].date(), date!(2024 - 01 - 01));
        assert_eq!(rows[1].get("X").expect("X").as_f64(), 2.0);
        assert_eq!(rows[1].get("Y").expect("Y").as_f64(), 3.0);
    }

    #[test]
    fn rows_yield_every_date_code_pair_once() {
        let set = DataSet::from_parts(
            strings(&["A", "B", "C"]),
            strings(&["X"]),
            strings(&["2024/01/01", "2024/01/02"]),
            doubles(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
        )
        .expect("data set");

        let seen: Vec<_> = set
            .rows()
            .map(|row| (row.date(), row.code().to_string()))
            .collect();
        assert_eq!(seen.len(), 6);
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 6);
        // Dates are outermost.
        assert_eq!(seen[0].0, date!(2024 - 01 - 01));
        assert_eq!(seen[2].0, date!(2024 - 01 - 01));
        assert_eq!(seen[3].0, date!(2024 - 01 - 02));
    }

    #[test]
    fn rows_remain_valid_after_iterator_is_dropped() {
        let set = DataSet::from_parts(
            strings(&["A"]),
            strings(&["X", "Y"]),
            strings(&["2024/03/05"]),
            doubles(&[7.0, 8.0]),
        )
        .expect("data set");

        let row = {
            let mut rows = set.rows();
            rows.next().expect("first row")
        };
        assert_eq!(row.indicator_count(), 2);
        assert_eq!(row.get("Y").expect("Y").as_f64(), 8.0);
        assert!(row.get("Z").is_none());
    }

    #[test]
    fn value_at_matches_packing_formula() {
        let set = DataSet::from_parts(
            strings(&["A", "B"]),
            strings(&["X", "Y"]),
            strings(&["2024/01/01", "2024/01/02"]),
            doubles(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
        )
        .expect("data set");

        // index = n_ind * n_code * date + n_ind * code + indicator
        assert_eq!(set.value_at(1, 0, 1).expect("value").as_f64(), 5.0);
        assert_eq!(set.value_at(0, 1, 0).expect("value").as_f64(), 2.0);
        assert!(set.value_at(2, 0, 0).is_none());
    }

    #[test]
    fn from_parts_rejects_bad_product() {
        let err = DataSet::from_parts(
            strings(&["A"]),
            strings(&["X"]),
            strings(&["2024/01/01"]),
            doubles(&[0.0, 1.0]),
        )
        .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        assert_eq!(
            err.dims(),
            Some(DimMismatch::Cube {
                values: 2,
                codes: 1,
                indicators: 1,
                dates: 1,
            })
        );
    }

    #[test]
    fn malformed_date_yields_zero_date() {
        assert_eq!(parse_row_date("not-a-date"), ZERO_DATE);
        assert_eq!(parse_row_date("2024/01/01"), date!(2024 - 01 - 01));
    }

    #[test]
    fn table_grid_lookup() {
        let table = Table::from_parts(2, 3, strings(&["a", "b", "c"]), doubles(&[0.0; 6]))
            .expect("table");
        assert!(table.value_at(1, 2).is_some());
        assert!(table.value_at(2, 0).is_none());
        assert!(table.value_at(0, 3).is_none());
    }

    #[test]
    fn table_rejects_bad_grid() {
        let err =
            Table::from_parts(2, 3, strings(&[]), doubles(&[0.0; 5])).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        assert_eq!(
            err.dims(),
            Some(DimMismatch::Table {
                values: 5,
                rows: 2,
                columns: 3,
            })
        );
    }
}
