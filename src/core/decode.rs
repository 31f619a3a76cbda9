//! Purpose: Validate and copy foreign result buffers into host-owned records.
//! Exports: `CubeGuard`, `decode_cube`, `decode_table`, guarded wrappers.
//! Role: The only place foreign result memory is read; everything is copied
//! before the release call, and no host structure retains a foreign pointer.
//! Invariants: Every decode attempt releases its buffer exactly once, on
//! success and on failure alike, after validation completes.
//! Invariants: Validation runs before any value is read: empty, then length
//! mismatch, then the pool sanity cap.
use std::slice;

use libc::c_void;

use crate::core::data::{DataSet, Table};
use crate::core::error::{DimMismatch, Error, ErrorKind};
use crate::core::pool::{MAX_DECODE_VALUES, VALUE_POOL};
use crate::core::sys::{self, EqChar, EqCharArray, EqCtrData, EqData, EqVariant};
use crate::core::value::{Value, ValueKind};

/// Owns a foreign result pointer for the duration of a decode and invokes
/// the module's release entry point exactly once on drop. A null pointer is
/// a no-op guard.
pub struct CubeGuard {
    ptr: *mut c_void,
    release: sys::ReleaserFn,
}

impl CubeGuard {
    pub fn new(ptr: *mut c_void, release: sys::ReleaserFn) -> Self {
        Self { ptr, release }
    }
}

impl Drop for CubeGuard {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        let status = unsafe { (self.release)(self.ptr) };
        if status != sys::EQERR_NONE {
            tracing::warn!(status, "foreign buffer release reported an error");
        }
    }
}

/// Decode a serial result buffer, releasing it on every path.
///
/// # Safety
///
/// `ptr` must be null or point to a live `EqData` owned by the module, and
/// `release` must be the module's release entry point.
pub unsafe fn decode_cube_guarded(
    ptr: *mut EqData,
    release: sys::ReleaserFn,
) -> Result<DataSet, Error> {
    let _cube = CubeGuard::new(ptr.cast(), release);
    unsafe { decode_cube(ptr) }
}

/// Decode a report result buffer, releasing it on every path.
///
/// # Safety
///
/// Same contract as [`decode_cube_guarded`], for `EqCtrData`.
pub unsafe fn decode_table_guarded(
    ptr: *mut EqCtrData,
    release: sys::ReleaserFn,
) -> Result<Table, Error> {
    let _cube = CubeGuard::new(ptr.cast(), release);
    unsafe { decode_table(ptr) }
}

/// Copy a serial result buffer into a host-owned `DataSet`.
///
/// # Safety
///
/// `ptr` must be null or point to a live, internally consistent `EqData`.
pub unsafe fn decode_cube(ptr: *const EqData) -> Result<DataSet, Error> {
    let Some(cube) = (unsafe { ptr.as_ref() }) else {
        return Err(Error::new(ErrorKind::DataEmpty).with_message("null result buffer"));
    };
    if cube.values.size == 0 || cube.values.items.is_null() {
        return Err(Error::new(ErrorKind::DataEmpty).with_message("result buffer holds no values"));
    }

    let n_values = cube.values.size as u64;
    let dims = DimMismatch::Cube {
        values: n_values,
        codes: cube.codes.size as u64,
        indicators: cube.indicators.size as u64,
        dates: cube.dates.size as u64,
    };
    let expected = (cube.codes.size as u64)
        .checked_mul(cube.indicators.size as u64)
        .and_then(|v| v.checked_mul(cube.dates.size as u64));
    if expected != Some(n_values) {
        return Err(Error::new(ErrorKind::LengthMismatch)
            .with_message("value buffer does not match code/indicator/date counts")
            .with_dims(dims));
    }
    check_decode_cap(n_values)?;

    let codes = unsafe { copy_string_array(&cube.codes) };
    let indicators = unsafe { copy_string_array(&cube.indicators) };
    let dates = unsafe { copy_string_array(&cube.dates) };
    let values = unsafe { copy_values(cube.values.items, n_values as usize) };

    Ok(DataSet::assemble(codes, indicators, dates, values))
}

/// Copy a report result buffer into a host-owned `Table`. Validates only the
/// row-by-column product; the indicator list is copied as-is.
///
/// # Safety
///
/// `ptr` must be null or point to a live, internally consistent `EqCtrData`.
pub unsafe fn decode_table(ptr: *const EqCtrData) -> Result<Table, Error> {
    let Some(grid) = (unsafe { ptr.as_ref() }) else {
        return Err(Error::new(ErrorKind::DataEmpty).with_message("null result buffer"));
    };
    if grid.values.size == 0 || grid.values.items.is_null() {
        return Err(Error::new(ErrorKind::DataEmpty).with_message("result buffer holds no values"));
    }

    let n_values = grid.values.size as u64;
    let expected = (grid.row as u64).checked_mul(grid.column as u64);
    if expected != Some(n_values) {
        return Err(Error::new(ErrorKind::LengthMismatch)
            .with_message("value buffer does not match row/column counts")
            .with_dims(DimMismatch::Table {
                values: n_values,
                rows: grid.row as u64,
                columns: grid.column as u64,
            }));
    }
    check_decode_cap(n_values)?;

    let indicators = unsafe { copy_string_array(&grid.indicators) };
    let values = unsafe { copy_values(grid.values.items, n_values as usize) };

    Ok(Table::assemble(
        grid.row as usize,
        grid.column as usize,
        indicators,
        values,
    ))
}

fn check_decode_cap(n_values: u64) -> Result<(), Error> {
    if n_values > MAX_DECODE_VALUES as u64 {
        return Err(Error::new(ErrorKind::Pool)
            .with_message(format!(
                "decode claims {n_values} records, over the {MAX_DECODE_VALUES} cap"
            )));
    }
    Ok(())
}

unsafe fn copy_values(items: *const EqVariant, count: usize) -> Vec<Value> {
    let variants = unsafe { slice::from_raw_parts(items, count) };
    let mut values = Vec::with_capacity(count);
    for variant in variants {
        let mut value = VALUE_POOL.acquire();
        unsafe { decode_value(variant, &mut value) };
        values.push(value);
    }
    values
}

/// Overwrite `out` from one foreign variant slot. Unrecognized tags decode
/// to null with a warning instead of failing the batch.
unsafe fn decode_value(variant: &EqVariant, out: &mut Value) {
    let kind = match variant.vtype {
        sys::VT_NULL => ValueKind::Null,
        sys::VT_CHAR | sys::VT_BYTE => ValueKind::Char,
        sys::VT_BOOL => ValueKind::Bool,
        sys::VT_SHORT => ValueKind::Short,
        sys::VT_USHORT => ValueKind::UShort,
        sys::VT_INT => ValueKind::Int,
        sys::VT_UINT => ValueKind::UInt,
        sys::VT_INT64 => ValueKind::Int64,
        sys::VT_UINT64 => ValueKind::UInt64,
        sys::VT_FLOAT => ValueKind::Single,
        sys::VT_DOUBLE => ValueKind::Double,
        sys::VT_BYTE_ARRAY => ValueKind::Bytes,
        sys::VT_ASCII_STRING | sys::VT_UNICODE_STRING => ValueKind::String,
        tag => {
            tracing::warn!(tag, "unrecognized foreign value tag, decoding as null");
            ValueKind::Null
        }
    };

    if kind == ValueKind::String {
        out.fill_text(unsafe { eq_char_bytes(&variant.text) });
    } else {
        out.fill_raw(kind, variant.union_bytes);
    }
}

unsafe fn copy_string_array(array: &EqCharArray) -> Vec<String> {
    if array.size == 0 || array.items.is_null() {
        return Vec::new();
    }
    let items = unsafe { slice::from_raw_parts(array.items, array.size as usize) };
    items
        .iter()
        .map(|item| String::from_utf8_lossy(unsafe { eq_char_bytes(item) }).into_owned())
        .collect()
}

/// Text bytes of a foreign string, excluding the reported terminator.
unsafe fn eq_char_bytes<'a>(text: &EqChar) -> &'a [u8] {
    if text.p_char.is_null() || text.size == 0 {
        return &[];
    }
    unsafe { slice::from_raw_parts(text.p_char as *const u8, text.size as usize - 1) }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{SlotSpec, cube, grid};
    use super::{CubeGuard, decode_cube, decode_cube_guarded, decode_table, decode_table_guarded};
    use crate::core::error::{DimMismatch, ErrorKind};
    use crate::core::sys::{self, EqErr};
    use crate::core::value::ValueKind;
    use libc::c_void;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn double_slot(value: f64) -> SlotSpec {
        SlotSpec::Raw(sys::VT_DOUBLE, value.to_le_bytes())
    }

    #[test]
    fn decodes_codes_indicators_dates_and_values() {
        let mut fixture = cube(
            &["000300.SH"],
            &["OPEN", "CLOSE"],
            &["2024/01/02", "2024/01/03"],
            vec![
                double_slot(1.0),
                double_slot(2.0),
                double_slot(3.0),
                double_slot(4.0),
            ],
        );
        let set = unsafe { decode_cube(fixture.as_ptr()) }.expect("decode");
        assert_eq!(set.codes(), ["000300.SH"]);
        assert_eq!(set.indicators(), ["OPEN", "CLOSE"]);
        assert_eq!(set.dates(), ["2024/01/02", "2024/01/03"]);
        assert_eq!(set.values().len(), 4);
        assert_eq!(set.value_at(1, 0, 1).expect("value").as_f64(), 4.0);
    }

    #[test]
    fn null_buffer_is_data_empty() {
        let err = unsafe { decode_cube(ptr::null()) }.expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::DataEmpty);
    }

    #[test]
    fn zero_values_is_data_empty() {
        let mut fixture = cube(&["A"], &["X"], &["2024/01/01"], vec![]);
        let err = unsafe { decode_cube(fixture.as_ptr()) }.expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::DataEmpty);
    }

    #[test]
    fn length_mismatch_carries_all_dimensions() {
        let mut fixture = cube(
            &["A", "B"],
            &["X", "Y"],
            &["2024/01/01"],
            vec![double_slot(0.0), double_slot(1.0), double_slot(2.0)],
        );
        let err = unsafe { decode_cube(fixture.as_ptr()) }.expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        assert_eq!(
            err.dims(),
            Some(DimMismatch::Cube {
                values: 3,
                codes: 2,
                indicators: 2,
                dates: 1,
            })
        );
    }

    #[test]
    fn string_slots_lose_their_terminator_exactly_once() {
        let mut fixture = cube(
            &["A"],
            &["NAME"],
            &["2024/01/01"],
            vec![SlotSpec::Text(
                sys::VT_ASCII_STRING,
                String::from("CSI 300"),
            )],
        );
        let set = unsafe { decode_cube(fixture.as_ptr()) }.expect("decode");
        let value = set.value_at(0, 0, 0).expect("value");
        assert_eq!(value.kind(), ValueKind::String);
        assert_eq!(value.as_str(), "CSI 300");
    }

    #[test]
    fn every_tag_maps_to_one_kind() {
        let cases = [
            (sys::VT_NULL, ValueKind::Null),
            (sys::VT_CHAR, ValueKind::Char),
            (sys::VT_BYTE, ValueKind::Char),
            (sys::VT_BOOL, ValueKind::Bool),
            (sys::VT_SHORT, ValueKind::Short),
            (sys::VT_USHORT, ValueKind::UShort),
            (sys::VT_INT, ValueKind::Int),
            (sys::VT_UINT, ValueKind::UInt),
            (sys::VT_INT64, ValueKind::Int64),
            (sys::VT_UINT64, ValueKind::UInt64),
            (sys::VT_FLOAT, ValueKind::Single),
            (sys::VT_DOUBLE, ValueKind::Double),
            (sys::VT_BYTE_ARRAY, ValueKind::Bytes),
        ];
        for (tag, kind) in cases {
            let mut fixture = cube(
                &["A"],
                &["X"],
                &["2024/01/01"],
                vec![SlotSpec::Raw(tag, 9u64.to_le_bytes())],
            );
            let set = unsafe { decode_cube(fixture.as_ptr()) }.expect("decode");
            assert_eq!(set.values()[0].kind(), kind, "tag {tag}");
        }
    }

    #[test]
    fn unrecognized_tag_decodes_to_null_without_aborting() {
        let mut fixture = cube(
            &["A"],
            &["X", "Y"],
            &["2024/01/01"],
            vec![SlotSpec::Raw(99, 5u64.to_le_bytes()), double_slot(7.0)],
        );
        let set = unsafe { decode_cube(fixture.as_ptr()) }.expect("decode survives");
        assert!(set.values()[0].is_null());
        assert_eq!(set.values()[1].as_f64(), 7.0);
    }

    #[test]
    fn guarded_decode_releases_exactly_once_on_success() {
        static RELEASES: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn release(_ptr: *mut c_void) -> EqErr {
            RELEASES.fetch_add(1, Ordering::SeqCst);
            sys::EQERR_NONE
        }

        let mut fixture = cube(&["A"], &["X"], &["2024/01/01"], vec![double_slot(1.0)]);
        let set =
            unsafe { decode_cube_guarded(fixture.as_ptr(), release) }.expect("decode");
        assert_eq!(set.values().len(), 1);
        assert_eq!(RELEASES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guarded_decode_releases_exactly_once_on_failure() {
        static RELEASES: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn release(_ptr: *mut c_void) -> EqErr {
            RELEASES.fetch_add(1, Ordering::SeqCst);
            sys::EQERR_NONE
        }

        let mut fixture = cube(
            &["A", "B"],
            &["X"],
            &["2024/01/01"],
            vec![double_slot(1.0)],
        );
        for attempt in 1..=3 {
            let err = unsafe { decode_cube_guarded(fixture.as_ptr(), release) }
                .expect_err("mismatch");
            assert_eq!(err.kind(), ErrorKind::LengthMismatch);
            assert_eq!(RELEASES.load(Ordering::SeqCst), attempt);
        }
    }

    #[test]
    fn null_pointer_guard_does_not_release() {
        static RELEASES: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn release(_ptr: *mut c_void) -> EqErr {
            RELEASES.fetch_add(1, Ordering::SeqCst);
            sys::EQERR_NONE
        }

        drop(CubeGuard::new(ptr::null_mut(), release));
        assert_eq!(RELEASES.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn grid_validates_row_column_product_only() {
        // Indicator count deliberately disagrees with the column count; the
        // weaker grid validation accepts it.
        let mut fixture = grid(
            2,
            2,
            &["ONLY"],
            vec![
                double_slot(0.0),
                double_slot(1.0),
                double_slot(2.0),
                double_slot(3.0),
            ],
        );
        let table = unsafe { decode_table(fixture.as_ptr()) }.expect("decode");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.indicators(), ["ONLY"]);
        assert_eq!(table.value_at(1, 1).expect("value").as_f64(), 3.0);
    }

    #[test]
    fn grid_mismatch_carries_grid_dimensions() {
        let mut fixture = grid(2, 3, &[], vec![double_slot(0.0)]);
        let err = unsafe { decode_table(fixture.as_ptr()) }.expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        assert_eq!(
            err.dims(),
            Some(DimMismatch::Table {
                values: 1,
                rows: 2,
                columns: 3,
            })
        );
    }

    #[test]
    fn grid_guarded_decode_releases_on_empty() {
        static RELEASES: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn release(_ptr: *mut c_void) -> EqErr {
            RELEASES.fetch_add(1, Ordering::SeqCst);
            sys::EQERR_NONE
        }

        let mut fixture = grid(0, 0, &[], vec![]);
        let err =
            unsafe { decode_table_guarded(fixture.as_ptr(), release) }.expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::DataEmpty);
        assert_eq!(RELEASES.load(Ordering::SeqCst), 1);
    }
}
