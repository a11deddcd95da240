pub mod parser;
pub mod reader;
pub mod record;
pub mod selector;

pub use parser::{LineParser, ParseError, DEFAULT_LINE_PATTERN};
pub use reader::{LogFileReader, ReaderError};
pub use record::{CounterRecord, Counters, COUNTER_NAMES};
pub use selector::{list_dir, select, RotationKey, SelectError, Selection};
