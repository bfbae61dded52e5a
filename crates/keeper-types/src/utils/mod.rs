//! Utility functions for formatting and numeric conversions.

pub mod conversion;
pub mod formatting;
pub mod helpers;

pub use conversion::saturating_u64;
pub use formatting::{format_token_amount, with_0x_prefix};
pub use helpers::current_timestamp;
