pub mod driver;

pub use driver::{
    BoundStatement, DriverError, DriverResult, PreparedStatement, ResultSet, Row, Session,
    StorageDriver,
};
