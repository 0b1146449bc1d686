use std::time::Duration;

pub(crate) const DEFAULT_THREAD_COUNT: u8 = 2;

pub(crate) const DEFAULT_THREAD_STACK_SIZE: usize = 8 * 1024 * 1024;

pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
