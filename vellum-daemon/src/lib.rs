//! Import job daemon: a bounded queue drained by a single worker, fronted by
//! a newline-delimited JSON socket.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_diff, request_poll, request_status, request_stop, request_submit, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, WorkerStats};
