// Raw foreign layouts and entry-point signatures for the provider module.
use libc::{c_char, c_int, c_uint, c_void};

/// Foreign status code; zero means success.
pub type EqErr = c_int;

pub const EQERR_NONE: EqErr = 0;

// Language selector for the error-message accessor.
pub const LANG_CN: c_int = 0;
pub const LANG_EN: c_int = 1;

// Value type tags carried by `EqVariant::vtype`.
pub const VT_NULL: c_int = 0;
pub const VT_CHAR: c_int = 1;
pub const VT_BYTE: c_int = 2;
pub const VT_BOOL: c_int = 3;
pub const VT_SHORT: c_int = 4;
pub const VT_USHORT: c_int = 5;
pub const VT_INT: c_int = 6;
pub const VT_UINT: c_int = 7;
pub const VT_INT64: c_int = 8;
pub const VT_UINT64: c_int = 9;
pub const VT_FLOAT: c_int = 10;
pub const VT_DOUBLE: c_int = 11;
pub const VT_BYTE_ARRAY: c_int = 12;
pub const VT_ASCII_STRING: c_int = 13;
pub const VT_UNICODE_STRING: c_int = 14;

// Asynchronous message kinds carried by `EqMsg::msg_type`.
pub const MT_ERROR: c_int = 0;
pub const MT_RESPONSE: c_int = 1;
pub const MT_PARTIAL_RESPONSE: c_int = 2;
pub const MT_OTHER: c_int = 3;

/// Length-prefixed foreign string; `size` counts the trailing terminator.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqChar {
    pub p_char: *mut c_char,
    pub size: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqCharArray {
    pub items: *mut EqChar,
    pub size: c_uint,
}

/// Tagged value slot. The 8-byte union payload is 8-aligned in the C layout,
/// hence the explicit pad after the tag.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqVariant {
    pub vtype: c_int,
    pub _pad: c_uint,
    pub union_bytes: [u8; 8],
    pub text: EqChar,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqVariantArray {
    pub items: *mut EqVariant,
    pub size: c_uint,
}

/// Serial result buffer: four parallel dense arrays, date-major, then code,
/// indicator fastest-varying.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqData {
    pub codes: EqCharArray,
    pub indicators: EqCharArray,
    pub dates: EqCharArray,
    pub values: EqVariantArray,
}

/// Report result buffer: a plain row-by-column grid.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqCtrData {
    pub row: c_uint,
    pub column: c_uint,
    pub indicators: EqCharArray,
    pub values: EqVariantArray,
}

/// Login structure staged by the host; the module only reads it during the
/// start call. Both fields are NUL-terminated in place.
#[repr(C)]
pub struct EqLoginInfo {
    pub user_name: [c_char; 255],
    pub password: [c_char; 255],
}

impl EqLoginInfo {
    pub fn new(user: &str, password: &str) -> Self {
        let mut info = Self {
            user_name: [0; 255],
            password: [0; 255],
        };
        copy_credential(&mut info.user_name, user);
        copy_credential(&mut info.password, password);
        info
    }
}

fn copy_credential(field: &mut [c_char; 255], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    for (dst, src) in field.iter_mut().zip(&bytes[..len]) {
        *dst = *src as c_char;
    }
}

/// Asynchronous event message delivered on a foreign-owned thread.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EqMsg {
    pub version: c_int,
    pub msg_type: c_int,
    pub err: EqErr,
    pub request_id: c_int,
    pub serial_id: c_int,
    pub data: *mut EqData,
}

// Host-side callback signatures handed to the module.
pub type LogCallback = unsafe extern "C" fn(*const c_char) -> c_int;
pub type DataCallback = unsafe extern "C" fn(*const EqMsg, *mut c_void) -> c_int;

// Foreign entry-point signatures resolved at load.
pub type CallbackSetterFn = unsafe extern "C" fn(DataCallback) -> EqErr;
pub type ServerListSetterFn = unsafe extern "C" fn(*const c_char) -> EqErr;
pub type ErrGetterFn = unsafe extern "C" fn(EqErr, c_int) -> *const c_char;
pub type StarterFn = unsafe extern "C" fn(*mut EqLoginInfo, *const c_char, LogCallback) -> EqErr;
pub type StopperFn = unsafe extern "C" fn() -> EqErr;
pub type ReleaserFn = unsafe extern "C" fn(*mut c_void) -> EqErr;
pub type QueryPchar1Fn = unsafe extern "C" fn(*const c_char, *mut *mut EqData) -> EqErr;
pub type QueryPchar2Fn = unsafe extern "C" fn(*const c_char, *const c_char, *mut *mut EqData) -> EqErr;
pub type QueryPchar3Fn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *mut *mut EqData) -> EqErr;
pub type QueryPchar5Fn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *mut *mut EqData,
) -> EqErr;
pub type QueryCfnFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    c_int,
    *const c_char,
    *mut *mut EqData,
) -> EqErr;
pub type QueryCtrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *mut *mut EqCtrData) -> EqErr;
