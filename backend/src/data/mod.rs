mod table;

pub use table::{Table, TableError};
