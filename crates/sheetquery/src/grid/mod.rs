//! Raw sheet grids, cell values and the file sources that load them.

mod cell;
mod predicate;
mod sheet;
mod source;

pub use cell::{number_value, parse_date, parse_number, CellValue};
pub use predicate::{json_text, Comparison};
pub use sheet::{GridMetadata, SheetGrid};
pub use source::{
    detect_delimiter, DirectorySource, DirectorySourceConfig, FileSource, MemorySource,
    SheetSelector,
};
