//! Purpose: Resolve the module's exported entry points into typed fn pointers.
//! Exports: `SymbolTable`.
//! Role: One-shot, all-or-nothing symbol resolution at load time; every field
//! is non-optional so a resolved table proves the full surface is present.
//! Invariants: Fn pointers are copied out of the library; the owning
//! `Library` must outlive the table, which the provider guarantees by
//! holding both and dropping the library last.
use libloading::Library;

use crate::core::error::{Error, ErrorKind};
use crate::core::sys;

/// Typed view of every export the bridge calls. Missing any one of them
/// fails the load with the operation and export name attached.
#[derive(Debug)]
pub struct SymbolTable {
    pub set_callback: sys::CallbackSetterFn,
    pub set_server_list_dir: sys::ServerListSetterFn,
    pub get_err_string: sys::ErrGetterFn,
    pub start: sys::StarterFn,
    pub stop: sys::StopperFn,
    pub release_data: sys::ReleaserFn,
    pub csd: sys::QueryPchar5Fn,
    pub css: sys::QueryPchar3Fn,
    pub cses: sys::QueryPchar3Fn,
    pub trade_dates: sys::QueryPchar3Fn,
    pub sector: sys::QueryPchar3Fn,
    pub ctr: sys::QueryCtrFn,
    pub edb: sys::QueryPchar2Fn,
    pub edb_query: sys::QueryPchar3Fn,
    pub cfn: sys::QueryCfnFn,
    pub cfn_query: sys::QueryPchar1Fn,
}

impl SymbolTable {
    /// Resolve all exports from an already-opened library.
    ///
    /// # Safety
    ///
    /// The library must export symbols with the ABI the `sys` aliases
    /// declare; a wrong signature is undetectable here and undefined to call.
    pub unsafe fn resolve(lib: &Library) -> Result<Self, Error> {
        Ok(Self {
            set_callback: unsafe { resolve_one(lib, b"setcallback\0")? },
            set_server_list_dir: unsafe { resolve_one(lib, b"setserverlistdir\0")? },
            get_err_string: unsafe { resolve_one(lib, b"geterrstring\0")? },
            start: unsafe { resolve_one(lib, b"start\0")? },
            stop: unsafe { resolve_one(lib, b"stop\0")? },
            release_data: unsafe { resolve_one(lib, b"releasedata\0")? },
            csd: unsafe { resolve_one(lib, b"csd\0")? },
            css: unsafe { resolve_one(lib, b"css\0")? },
            cses: unsafe { resolve_one(lib, b"cses\0")? },
            trade_dates: unsafe { resolve_one(lib, b"tradedates\0")? },
            sector: unsafe { resolve_one(lib, b"sector\0")? },
            ctr: unsafe { resolve_one(lib, b"ctr\0")? },
            edb: unsafe { resolve_one(lib, b"edb\0")? },
            edb_query: unsafe { resolve_one(lib, b"edbquery\0")? },
            cfn: unsafe { resolve_one(lib, b"cfn\0")? },
            cfn_query: unsafe { resolve_one(lib, b"cfnquery\0")? },
        })
    }
}

unsafe fn resolve_one<T: Copy>(lib: &Library, export: &[u8]) -> Result<T, Error> {
    let name = std::str::from_utf8(&export[..export.len() - 1]).unwrap_or("<non-utf8>");
    let symbol = unsafe { lib.get::<T>(export) }.map_err(|source| {
        Error::new(ErrorKind::Load)
            .with_message("module is missing a required export")
            .with_operation("resolve")
            .with_symbol(name)
            .with_source(source)
    })?;
    Ok(*symbol)
}
