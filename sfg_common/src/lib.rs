mod rial;

pub mod op;
mod secret;

pub mod helpers;

pub use rial::{Rial, RialConversionError, RIAL_CURRENCY_CODE, RIAL_CURRENCY_CODE_LOWER};
pub use secret::Secret;
