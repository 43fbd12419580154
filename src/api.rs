pub mod link;
pub mod v1;

pub use self::link::LinkHints;
pub use self::v1::*;
