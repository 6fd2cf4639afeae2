use core::fmt;

macro_rules! feature {
    (
        #![$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg($meta)]
            $item
        )*
    }
}

macro_rules! test_trace {
    ($($tt:tt)*) => {
        #[cfg(test)]
        tracing::trace!($($tt)*)
    }
}

macro_rules! loom_const_fn {
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident($($arg:ident: $T:ty),*) -> $Ret:ty $body:block
    ) => {
        $(#[$meta])*
        #[cfg(not(loom))]
        $vis const fn $name($($arg: $T),*) -> $Ret $body

        $(#[$meta])*
        #[cfg(loom)]
        $vis fn $name($($arg: $T),*) -> $Ret $body
    }
}

pub(crate) struct FmtOption<'a, T> {
    opt: Option<&'a T>,
    or_else: &'a str,
}

// === impl FmtOption ===

impl<'a, T> FmtOption<'a, T> {
    pub(crate) fn new(opt: &'a Option<T>) -> Self {
        Self {
            opt: opt.as_ref(),
            or_else: "None",
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FmtOption<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opt {
            Some(val) => val.fmt(f),
            None => f.write_str(self.or_else),
        }
    }
}

/// Lowers `target` to `val` if `val` is smaller.
pub(crate) fn atomic_min(target: &crate::loom::atomic::AtomicUsize, val: usize) {
    use crate::loom::atomic::Ordering::SeqCst;
    let mut curr = target.load(SeqCst);
    while val < curr {
        match target.compare_exchange_weak(curr, val, SeqCst, SeqCst) {
            Ok(_) => return,
            Err(actual) => curr = actual,
        }
    }
}

/// Raises `target` to `val` if `val` is larger.
pub(crate) fn atomic_max(target: &crate::loom::atomic::AtomicUsize, val: usize) {
    use crate::loom::atomic::Ordering::SeqCst;
    let mut curr = target.load(SeqCst);
    while val > curr {
        match target.compare_exchange_weak(curr, val, SeqCst, SeqCst) {
            Ok(_) => return,
            Err(actual) => curr = actual,
        }
    }
}

feature! {
    #![test]

    pub(crate) fn trace_init() -> tracing::dispatcher::DefaultGuard {
        use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_target(false)
            .finish()
            .set_default()
    }

    pub(crate) fn assert_send_sync<T: Send + Sync>() {}
}
