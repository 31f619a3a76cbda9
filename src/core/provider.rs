//! Purpose: Own the loaded module and drive its lifecycle and query surface.
//! Exports: `Provider`, `CfnMode`, `MAX_INDICATOR_COUNT`, `unload`.
//! Role: Single owner of the `Library` handle and resolved symbol table;
//! every foreign call in the crate goes through a method here.
//! Invariants: `start` runs the foreign start at most once and memoizes its
//! outcome; `stop` runs the foreign stop at most once after a successful
//! start and is a logged no-op otherwise.
//! Invariants: The `Library` is the last field, so the symbol table is
//! dropped before the code it points into is unmapped.
use std::env;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use libloading::Library;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::core::callback;
use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::data::{DataSet, Table};
use crate::core::decode::{self, CubeGuard};
use crate::core::error::{Error, ErrorKind};
use crate::core::options::OptionString;
use crate::core::registry;
use crate::core::symbols::SymbolTable;
use crate::core::sys::{self, EqCtrData, EqData, EqErr, EqLoginInfo};

/// Most indicators one query may carry; the module truncates beyond this.
pub const MAX_INDICATOR_COUNT: usize = 64;

/// Most block codes one `cses` call may carry.
const MAX_BLOCK_CODES: usize = 6;

const QUERY_DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Selection mode for the news query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CfnMode {
    /// Latest N items ending at a date.
    EndCount = 0,
    /// All items inside a date range.
    DateRange = 1,
}

/// Memoized lifecycle failure, replayable to every later caller.
#[derive(Clone, Debug)]
struct SavedError {
    kind: ErrorKind,
    status: Option<i32>,
    rendered: String,
}

impl SavedError {
    fn capture(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            status: err.status(),
            rendered: err.to_string(),
        }
    }

    fn replay(&self) -> Error {
        let mut err = Error::new(self.kind).with_message(self.rendered.clone());
        if let Some(status) = self.status {
            err = err.with_status(status);
        }
        err
    }
}

#[derive(Debug)]
pub struct Provider {
    lib_path: PathBuf,
    table: SymbolTable,
    started: AtomicBool,
    start_state: OnceLock<Option<SavedError>>,
    stop_state: OnceLock<Option<SavedError>>,
    root: CancelToken,
    _library: Library,
}

impl Provider {
    /// Load the module described by `config`, or hand back the instance that
    /// is already installed. The first successful load wins process-wide.
    pub fn load(config: &Config) -> Result<Arc<Self>, Error> {
        if let Some(existing) = registry::get() {
            tracing::debug!(path = %existing.lib_path.display(), "module already loaded");
            return Ok(existing);
        }
        let provider = Arc::new(Self::open(config)?);
        Ok(registry::install(provider))
    }

    fn open(config: &Config) -> Result<Self, Error> {
        let file = platform_library_file(&config.lib_name)?;
        let lib_path = config.lib_dir.join(file);
        prepare_environment(&config.lib_dir);

        tracing::info!(path = %lib_path.display(), "loading provider module");
        let library = unsafe { Library::new(&lib_path) }.map_err(|source| {
            Error::new(ErrorKind::Load)
                .with_message(format!("failed to open {}", lib_path.display()))
                .with_operation("load")
                .with_source(source)
        })?;
        let table = unsafe { SymbolTable::resolve(&library) }?;

        let status = unsafe { (table.set_callback)(callback::data_callback) };
        check_status(&table, status, "setcallback")?;
        if let Some(dir) = &config.server_list_dir {
            let dir_c = c_string(dir.to_string_lossy().into_owned())?;
            let status = unsafe { (table.set_server_list_dir)(dir_c.as_ptr()) };
            check_status(&table, status, "setserverlistdir")?;
        }

        Ok(Self {
            lib_path,
            table,
            started: AtomicBool::new(false),
            start_state: OnceLock::new(),
            stop_state: OnceLock::new(),
            root: CancelToken::new(),
            _library: library,
        })
    }

    pub fn lib_path(&self) -> &Path {
        &self.lib_path
    }

    /// Token cancelled when the provider stops. Clones share one state.
    pub fn cancel_token(&self) -> CancelToken {
        self.root.clone()
    }

    /// Authenticate and start the module's worker threads. The foreign start
    /// runs at most once; every later call observes the first outcome,
    /// success or failure.
    pub fn start(
        &self,
        user: &str,
        password: &str,
        options: Option<&dyn OptionString>,
    ) -> Result<(), Error> {
        let outcome = self.start_state.get_or_init(|| {
            match self.start_inner(user, password, options) {
                Ok(()) => {
                    self.started.store(true, Ordering::Release);
                    tracing::info!("provider started");
                    None
                }
                Err(err) => {
                    tracing::error!(error = %err, "provider start failed");
                    Some(SavedError::capture(&err))
                }
            }
        });
        match outcome {
            None => Ok(()),
            Some(saved) => Err(saved.replay()),
        }
    }

    fn start_inner(
        &self,
        user: &str,
        password: &str,
        options: Option<&dyn OptionString>,
    ) -> Result<(), Error> {
        let mut login = EqLoginInfo::new(user, password);
        let options_c = options_c_string(options)?;
        let status =
            unsafe { (self.table.start)(&mut login, options_c.as_ptr(), callback::log_callback) };
        check_status(&self.table, status, "start")
    }

    /// Stop the module's worker threads. Runs the foreign stop at most once;
    /// later calls observe the first outcome. Before a successful start it
    /// logs and returns `Ok`.
    pub fn stop(&self) -> Result<(), Error> {
        if let Some(outcome) = self.stop_state.get() {
            return match outcome {
                None => Ok(()),
                Some(saved) => Err(saved.replay()),
            };
        }
        if !self.started.load(Ordering::Acquire) {
            tracing::warn!("stop requested before a successful start; ignoring");
            return Ok(());
        }
        // `started` stays set until the outcome is published, so a racing
        // caller blocks on the `OnceLock` here instead of slipping through
        // the not-started return above with the first stop still in flight.
        let outcome = self.stop_state.get_or_init(|| {
            self.root.cancel();
            let status = unsafe { (self.table.stop)() };
            tracing::info!("provider stopped");
            match check_status(&self.table, status, "stop") {
                Ok(()) => None,
                Err(err) => Some(SavedError::capture(&err)),
            }
        });
        self.started.store(false, Ordering::Release);
        match outcome {
            None => Ok(()),
            Some(saved) => Err(saved.replay()),
        }
    }

    /// English message for a foreign status code.
    pub(crate) fn status_text(&self, status: EqErr) -> String {
        status_text(&self.table, status)
    }

    /// Daily/weekly serial query over a date range.
    pub fn csd(
        &self,
        codes: &[&str],
        indicators: &[&str],
        start: Date,
        end: Date,
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("csd")?;
        validate_codes(codes, "csd")?;
        validate_indicators(indicators, "csd")?;
        let codes_c = join_c(codes)?;
        let indicators_c = join_c(indicators)?;
        let start_c = query_date(start)?;
        let end_c = query_date(end)?;
        let options_c = options_c_string(options)?;
        let mut out: *mut EqData = ptr::null_mut();
        let status = unsafe {
            (self.table.csd)(
                codes_c.as_ptr(),
                indicators_c.as_ptr(),
                start_c.as_ptr(),
                end_c.as_ptr(),
                options_c.as_ptr(),
                &mut out,
            )
        };
        self.decode_result(status, out, "csd")
    }

    /// Cross-section snapshot query.
    pub fn css(
        &self,
        codes: &[&str],
        indicators: &[&str],
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("css")?;
        validate_codes(codes, "css")?;
        validate_indicators(indicators, "css")?;
        self.pchar3_query(
            self.table.css,
            join_c(codes)?,
            join_c(indicators)?,
            options,
            "css",
        )
    }

    /// Cross-section query over sector block codes; at most
    /// `MAX_BLOCK_CODES` blocks per call.
    pub fn cses(
        &self,
        block_codes: &[&str],
        indicators: &[&str],
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("cses")?;
        validate_codes(block_codes, "cses")?;
        if block_codes.len() > MAX_BLOCK_CODES {
            return Err(Error::new(ErrorKind::InvalidArgs)
                .with_message(format!(
                    "{} block codes passed, at most {MAX_BLOCK_CODES} allowed",
                    block_codes.len()
                ))
                .with_operation("cses"));
        }
        validate_indicators(indicators, "cses")?;
        self.pchar3_query(
            self.table.cses,
            join_c(block_codes)?,
            join_c(indicators)?,
            options,
            "cses",
        )
    }

    /// Trading calendar between two dates.
    pub fn trade_dates(
        &self,
        start: Date,
        end: Date,
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("tradedates")?;
        self.pchar3_query(
            self.table.trade_dates,
            query_date(start)?,
            query_date(end)?,
            options,
            "tradedates",
        )
    }

    /// Constituents of a sector block on a trade date.
    pub fn sector(
        &self,
        block_code: &str,
        trade_date: Date,
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("sector")?;
        if block_code.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgs)
                .with_message("no block code passed")
                .with_operation("sector"));
        }
        self.pchar3_query(
            self.table.sector,
            c_string(block_code)?,
            query_date(trade_date)?,
            options,
            "sector",
        )
    }

    /// Report table query; the only call that yields a 2-D `Table`.
    pub fn ctr(
        &self,
        name: &str,
        indicators: &[&str],
        options: Option<&dyn OptionString>,
    ) -> Result<Table, Error> {
        self.ensure_started("ctr")?;
        if name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgs)
                .with_message("no report name passed")
                .with_operation("ctr"));
        }
        if indicators.len() > MAX_INDICATOR_COUNT {
            return Err(indicator_overflow(indicators.len(), "ctr"));
        }
        let name_c = c_string(name)?;
        let indicators_c = join_c(indicators)?;
        let options_c = options_c_string(options)?;
        let mut out: *mut EqCtrData = ptr::null_mut();
        let status = unsafe {
            (self.table.ctr)(
                name_c.as_ptr(),
                indicators_c.as_ptr(),
                options_c.as_ptr(),
                &mut out,
            )
        };
        if status != sys::EQERR_NONE {
            drop(CubeGuard::new(out.cast(), self.table.release_data));
            return Err(self.status_error(status, "ctr"));
        }
        unsafe { decode::decode_table_guarded(out, self.table.release_data) }
            .map_err(|err| err.with_operation("ctr"))
    }

    /// Macro-economy series by indicator id.
    pub fn edb(
        &self,
        ids: &[&str],
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("edb")?;
        validate_codes(ids, "edb")?;
        let ids_c = join_c(ids)?;
        let options_c = options_c_string(options)?;
        let mut out: *mut EqData = ptr::null_mut();
        let status = unsafe { (self.table.edb)(ids_c.as_ptr(), options_c.as_ptr(), &mut out) };
        self.decode_result(status, out, "edb")
    }

    /// Metadata lookup for macro-economy indicator ids.
    pub fn edb_query(
        &self,
        ids: &[&str],
        indicators: &[&str],
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("edbquery")?;
        validate_codes(ids, "edbquery")?;
        validate_indicators(indicators, "edbquery")?;
        self.pchar3_query(
            self.table.edb_query,
            join_c(ids)?,
            join_c(indicators)?,
            options,
            "edbquery",
        )
    }

    /// News query for a code list.
    pub fn cfn(
        &self,
        codes: &[&str],
        content: &str,
        mode: CfnMode,
        options: Option<&dyn OptionString>,
    ) -> Result<DataSet, Error> {
        self.ensure_started("cfn")?;
        validate_codes(codes, "cfn")?;
        let codes_c = join_c(codes)?;
        let content_c = c_string(content)?;
        let options_c = options_c_string(options)?;
        let mut out: *mut EqData = ptr::null_mut();
        let status = unsafe {
            (self.table.cfn)(
                codes_c.as_ptr(),
                content_c.as_ptr(),
                mode as libc::c_int,
                options_c.as_ptr(),
                &mut out,
            )
        };
        self.decode_result(status, out, "cfn")
    }

    /// News block-tree query; carries everything in the option string.
    pub fn cfn_query(&self, options: Option<&dyn OptionString>) -> Result<DataSet, Error> {
        self.ensure_started("cfnquery")?;
        let options_c = options_c_string(options)?;
        let mut out: *mut EqData = ptr::null_mut();
        let status = unsafe { (self.table.cfn_query)(options_c.as_ptr(), &mut out) };
        self.decode_result(status, out, "cfnquery")
    }

    fn pchar3_query(
        &self,
        query: sys::QueryPchar3Fn,
        first: CString,
        second: CString,
        options: Option<&dyn OptionString>,
        operation: &str,
    ) -> Result<DataSet, Error> {
        let options_c = options_c_string(options)?;
        let mut out: *mut EqData = ptr::null_mut();
        let status = unsafe {
            query(
                first.as_ptr(),
                second.as_ptr(),
                options_c.as_ptr(),
                &mut out,
            )
        };
        self.decode_result(status, out, operation)
    }

    fn decode_result(
        &self,
        status: EqErr,
        out: *mut EqData,
        operation: &str,
    ) -> Result<DataSet, Error> {
        if status != sys::EQERR_NONE {
            // Some failures still hand out a buffer; the guard keeps the
            // release exactly-once either way.
            drop(CubeGuard::new(out.cast(), self.table.release_data));
            return Err(self.status_error(status, operation));
        }
        unsafe { decode::decode_cube_guarded(out, self.table.release_data) }
            .map_err(|err| err.with_operation(operation))
    }

    fn status_error(&self, status: EqErr, operation: &str) -> Error {
        Error::new(ErrorKind::ForeignCall)
            .with_message(self.status_text(status))
            .with_operation(operation)
            .with_status(status)
    }

    fn ensure_started(&self, operation: &str) -> Result<(), Error> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        Err(Error::new(ErrorKind::NotInitialized)
            .with_message("provider has not been started")
            .with_operation(operation))
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        // Last-resort teardown when the owner never called stop.
        self.root.cancel();
        self.stop_state.get_or_init(|| {
            let status = unsafe { (self.table.stop)() };
            if status != sys::EQERR_NONE {
                tracing::warn!(status, "foreign stop reported an error during drop");
            }
            None
        });
    }
}

/// Stop (if needed) and discharge the installed provider. The module is
/// unmapped once the last outstanding handle drops.
pub fn unload() -> Result<(), Error> {
    let Some(provider) = registry::take() else {
        return Ok(());
    };
    provider.stop()?;
    drop(provider);
    Ok(())
}

fn platform_library_file(name: &str) -> Result<String, Error> {
    if cfg!(target_os = "linux") {
        Ok(format!("lib{name}.so"))
    } else if cfg!(target_os = "macos") {
        Ok(format!("lib{name}.dylib"))
    } else if cfg!(target_os = "windows") {
        Ok(format!("{name}.dll"))
    } else {
        Err(Error::new(ErrorKind::UnsupportedPlatform)
            .with_message("no provider module is published for this platform"))
    }
}

/// Make the module's bundled dependencies resolvable from its own directory.
fn prepare_environment(lib_dir: &Path) {
    if cfg!(target_os = "windows") {
        return;
    }
    let var = if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    };
    let mut value = lib_dir.as_os_str().to_os_string();
    if let Some(existing) = env::var_os(var) {
        value.push(":");
        value.push(existing);
    }
    unsafe { env::set_var(var, value) };
}

fn check_status(table: &SymbolTable, status: EqErr, operation: &str) -> Result<(), Error> {
    if status == sys::EQERR_NONE {
        return Ok(());
    }
    Err(Error::new(ErrorKind::ForeignCall)
        .with_message(status_text(table, status))
        .with_operation(operation)
        .with_status(status))
}

fn status_text(table: &SymbolTable, status: EqErr) -> String {
    let text = unsafe { (table.get_err_string)(status, sys::LANG_EN) };
    if text.is_null() {
        return format!("foreign status {status}");
    }
    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
}

fn validate_codes(codes: &[&str], operation: &str) -> Result<(), Error> {
    if codes.is_empty() {
        return Err(Error::new(ErrorKind::InvalidArgs)
            .with_message("no codes passed")
            .with_operation(operation));
    }
    Ok(())
}

fn validate_indicators(indicators: &[&str], operation: &str) -> Result<(), Error> {
    if indicators.is_empty() {
        return Err(Error::new(ErrorKind::InvalidArgs)
            .with_message("no indicators passed")
            .with_operation(operation));
    }
    if indicators.len() > MAX_INDICATOR_COUNT {
        return Err(indicator_overflow(indicators.len(), operation));
    }
    Ok(())
}

fn indicator_overflow(count: usize, operation: &str) -> Error {
    Error::new(ErrorKind::InvalidArgs)
        .with_message(format!(
            "{count} indicators passed, at most {MAX_INDICATOR_COUNT} allowed"
        ))
        .with_operation(operation)
}

fn query_date(date: Date) -> Result<CString, Error> {
    let text = date.format(QUERY_DATE_FORMAT).map_err(|source| {
        Error::new(ErrorKind::InvalidArgs)
            .with_message("date is not representable in the query format")
            .with_source(source)
    })?;
    c_string(text)
}

fn join_c(items: &[&str]) -> Result<CString, Error> {
    c_string(items.join(","))
}

fn options_c_string(options: Option<&dyn OptionString>) -> Result<CString, Error> {
    c_string(options.map(OptionString::option_string).unwrap_or_default())
}

fn c_string(text: impl Into<Vec<u8>>) -> Result<CString, Error> {
    CString::new(text).map_err(|source| {
        Error::new(ErrorKind::InvalidArgs)
            .with_message("argument contains an embedded NUL")
            .with_source(source)
    })
}

#[cfg(test)]
impl Provider {
    /// Build a provider over the host process handle and a stub symbol
    /// table, bypassing the on-disk module.
    pub(crate) fn with_table(table: SymbolTable) -> Self {
        Self {
            lib_path: PathBuf::from("stub://module"),
            table,
            started: AtomicBool::new(false),
            start_state: OnceLock::new(),
            stop_state: OnceLock::new(),
            root: CancelToken::new(),
            _library: libloading::os::unix::Library::this().into(),
        }
    }
}
