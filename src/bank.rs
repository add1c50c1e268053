pub use access::Access;
pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use error::{Error, ErrorKind};
pub use retry::RetryPolicy;
pub use service::{Context, NewService, Result, Service};

mod access;
mod cancel;
mod error;
mod retry;
mod service;
