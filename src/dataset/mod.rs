//! Provider session dataset: source reading, preprocessing and the record model.

pub mod encoder;
pub mod loader;
pub mod preprocess;
mod record;

pub use loader::{Cell, DatasetLoadError, RawRow, RawTable, load_dataset, read_table};
pub use preprocess::{PreprocessError, preprocess};
pub use record::{Dataset, FEATURE_LEN, FEATURE_NAMES, Record, TimeCategory, is_peak_hour};
