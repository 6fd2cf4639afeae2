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

feature! {
    #![test]

    pub(crate) fn trace_init() -> tracing::dispatcher::DefaultGuard {
        use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_thread_ids(true)
            .finish()
            .set_default()
    }

    pub(crate) fn assert_send_sync<T: Send + Sync>() {}
}
