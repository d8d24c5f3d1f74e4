//! HTTP transport and retry handling.

mod retry;
mod transport;

pub use retry::{
    CONCURRENT_MODIFICATION, RETRY_DELAY, RETRY_TIMEOUT, RetryPolicy, is_concurrent_modification,
    retry_on_concurrent_modification,
};
#[cfg(test)]
pub use transport::MockHttpTransport;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TlsOptions};
