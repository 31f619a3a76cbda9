// Core modules implementing module lifecycle, buffer decoding, and error modeling.
pub mod callback;
pub mod cancel;
pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod options;
pub mod pool;
pub mod provider;
pub mod registry;
pub mod symbols;
pub mod sys;
pub mod value;
