//! Domain value types.

mod value;
mod value_type;

pub use value::{Value, format_date, parse_date};
pub use value_type::ValueType;
