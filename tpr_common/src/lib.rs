mod amount;
mod flag;
mod secret;

pub use amount::{Amount, AmountConversionError};
pub use flag::{is_set, Flag};
pub use secret::Secret;
