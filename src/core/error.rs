use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    UnsupportedPlatform,
    Load,
    NotInitialized,
    ForeignCall,
    DataEmpty,
    LengthMismatch,
    InvalidArgs,
    Pool,
    Io,
}

/// Dimension counts carried by a `LengthMismatch` error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DimMismatch {
    Cube {
        values: u64,
        codes: u64,
        indicators: u64,
        dates: u64,
    },
    Table {
        values: u64,
        rows: u64,
        columns: u64,
    },
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    operation: Option<String>,
    symbol: Option<String>,
    status: Option<i32>,
    dims: Option<DimMismatch>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            operation: None,
            symbol: None,
            status: None,
            dims: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<i32> {
        self.status
    }

    pub fn dims(&self) -> Option<DimMismatch> {
        self.dims
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_dims(mut self, dims: DimMismatch) -> Self {
        self.dims = Some(dims);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(operation) = &self.operation {
            write!(f, " (operation: {operation})")?;
        }
        if let Some(symbol) = &self.symbol {
            write!(f, " (symbol: {symbol})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        match self.dims {
            Some(DimMismatch::Cube {
                values,
                codes,
                indicators,
                dates,
            }) => write!(
                f,
                " (values: {values}, codes: {codes}, indicators: {indicators}, dates: {dates})"
            )?,
            Some(DimMismatch::Table {
                values,
                rows,
                columns,
            }) => write!(f, " (values: {values}, rows: {rows}, columns: {columns})")?,
            None => {}
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{DimMismatch, Error, ErrorKind};

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::Load)
            .with_message("symbol missing")
            .with_operation("serial-query")
            .with_symbol("csd");
        let text = err.to_string();
        assert!(text.contains("Load"));
        assert!(text.contains("symbol missing"));
        assert!(text.contains("operation: serial-query"));
        assert!(text.contains("symbol: csd"));
    }

    #[test]
    fn dims_are_carried_and_displayed() {
        let err = Error::new(ErrorKind::LengthMismatch).with_dims(DimMismatch::Cube {
            values: 5,
            codes: 2,
            indicators: 2,
            dates: 1,
        });
        assert_eq!(
            err.dims(),
            Some(DimMismatch::Cube {
                values: 5,
                codes: 2,
                indicators: 2,
                dates: 1,
            })
        );
        let text = err.to_string();
        assert!(text.contains("values: 5"));
        assert!(text.contains("codes: 2"));
    }

    #[test]
    fn status_round_trips() {
        let err = Error::new(ErrorKind::ForeignCall).with_status(10001);
        assert_eq!(err.status(), Some(10001));
        assert!(err.to_string().contains("status: 10001"));
    }
}
