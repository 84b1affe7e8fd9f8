//! Data model: type descriptors, values, headers and tuples.

mod header;
mod tuple;
mod value;

pub use header::Field;
pub use header::Header;
pub use header::KeyField;
pub use tuple::Data;
pub use tuple::Key;
pub use tuple::KeyPrefix;
pub use tuple::Tuple;
pub use tuple::prefix_of;
pub use tuple::sdata;
pub use tuple::skey;
pub use value::Timestamp;
pub use value::Value;
pub use value::ValueType;
