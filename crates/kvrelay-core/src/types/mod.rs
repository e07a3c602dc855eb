mod key;
mod mode;
mod response;
mod value;

pub use key::{Key, KeyColumn, KeySchema};
pub use mode::BacklogMode;
pub use response::{Outcome, Response, RowMatch};
pub use value::{StorableValue, Value, ValueType};
