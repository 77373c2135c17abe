use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};

pub mod thread_actor;

fn runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("blockflow-runtime")
            .build()
            .expect("failed to build shared tokio runtime")
    })
}

/// Drives `future` to completion on the shared runtime from a plain thread.
///
/// Must not be called from inside an async task.
pub fn block_on<F: Future>(future: F) -> F::Output {
    runtime().block_on(future)
}
