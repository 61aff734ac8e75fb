//! Conversion request/result model, error taxonomy and the [`Converter`] trait.

mod error;
mod traits;
mod types;
pub mod wire;

pub use error::{ConversionError, ErrorKind};
pub use traits::Converter;
pub use types::{
    suggested_filename, AuxResults, ConversionOptions, ConversionRequest, ConversionResult,
    AUX_SUMMARY, AUX_TEXT,
};
