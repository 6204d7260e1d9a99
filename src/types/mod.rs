pub mod error;
pub mod header;
pub mod proxy;
pub mod request;
pub mod response;
pub mod result;
pub mod target;
pub mod timeouts;

pub use error::*;
pub use header::*;
pub use proxy::*;
pub use request::*;
pub use response::*;
pub use result::*;
pub use target::*;
pub use timeouts::*;
