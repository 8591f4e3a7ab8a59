//! Tools for limiting the number of concurrent CPU-bound external processes.

use std::sync::LazyLock;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// Semaphore used to limit the number of concurrent `pdftocairo` and
/// `tesseract` processes.
static CPU_SEMAPHORE: LazyLock<Semaphore> =
    LazyLock::new(|| Semaphore::new(num_cpus::get()));

/// Call an async function while holding a permit from the CPU semaphore.
///
/// The page jobs of one document are already bounded by `--page-jobs`, but
/// several documents may be processed at once, and each `tesseract` process
/// will happily use a whole core. This keeps the total number of busy external
/// processes near the number of CPUs.
///
/// The outer [`Result`] only fails if the semaphore has been closed. The value
/// returned by `f` is passed through untouched, so callers can keep their own
/// error types.
#[instrument(level = "trace", skip_all)]
pub async fn with_cpu_semaphore<Func, Fut, T>(f: Func) -> Result<T>
where
    Func: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("Could not acquire CPU permit")?;
    let result = f().await;
    drop(permit);
    Ok(result)
}
