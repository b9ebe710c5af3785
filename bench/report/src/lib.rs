mod prints;
mod types;
mod utils;

pub use prints::{results_table, RESULTS_TABLE_HEADER};
pub use types::*;
