//! Error types for the paraprop core library.
//!
//! Only misuse and infrastructure failures are errors. Property violations,
//! timeouts, and panicking check bodies are test outcomes and are recorded in
//! [`crate::TestResult`] instead.

use std::fmt;

use thiserror::Error;

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// Error type produced when configuring or driving the execution engine.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParapropError {
    /// Work was submitted to a pool that has already been shut down.
    #[error("cannot enqueue work on a thread pool that has been shut down")]
    PoolShutDown,
    /// The operating system refused to spawn a thread.
    #[error("failed to spawn thread `{thread}`: {message}")]
    WorkerSpawn {
        /// Name given to the thread that could not be started.
        thread: String,
        /// Rendered I/O error reported by the platform.
        message: String,
    },
    /// A unit of work panicked while running on a pool worker.
    #[error("pool task panicked: {message}")]
    TaskPanicked {
        /// Panic payload rendered as text.
        message: String,
    },
    /// A task handle lost contact with its worker before an outcome arrived.
    #[error("pool task was dropped before reporting an outcome")]
    TaskLost,
    /// A distributor was constructed without any runners.
    #[error("test distributor requires at least one runner")]
    NoRunners,
    /// An affinity selector picked a runner that does not exist.
    #[error("runner selector returned index {index} but only {runners} runners exist")]
    RunnerIndexOutOfRange {
        /// Index produced by the selector.
        index: usize,
        /// Number of runners owned by the distributor.
        runners: usize,
    },
    /// A configuration value was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the rejected value.
        reason: String,
    },
    /// A manual override named a pool that was never registered.
    #[error("no thread pool named `{name}` is registered")]
    UnknownPool {
        /// Requested pool name.
        name: String,
    },
    /// A pool registration carried a zero lower bound or inverted bounds.
    #[error("thread pool `{name}` has invalid bounds [{min}, {max}]")]
    InvalidPoolBounds {
        /// Name of the offending registration.
        name: String,
        /// Requested lower bound.
        min: usize,
        /// Requested upper bound.
        max: usize,
    },
    /// The counterexample persistence collaborator reported a failure.
    #[error("counterexample store failed: {message}")]
    Store {
        /// Rendered error from the store implementation.
        message: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`ParapropError`] variants.
    enum ParapropErrorCode for ParapropError {
        /// Work was submitted to a pool that has already been shut down.
        PoolShutDown => PoolShutDown => "PARAPROP_POOL_SHUT_DOWN",
        /// The operating system refused to spawn a thread.
        WorkerSpawn => WorkerSpawn { .. } => "PARAPROP_WORKER_SPAWN",
        /// A unit of work panicked while running on a pool worker.
        TaskPanicked => TaskPanicked { .. } => "PARAPROP_TASK_PANICKED",
        /// A task handle lost contact with its worker.
        TaskLost => TaskLost => "PARAPROP_TASK_LOST",
        /// A distributor was constructed without any runners.
        NoRunners => NoRunners => "PARAPROP_NO_RUNNERS",
        /// An affinity selector picked a runner that does not exist.
        RunnerIndexOutOfRange => RunnerIndexOutOfRange { .. } => "PARAPROP_RUNNER_INDEX_OUT_OF_RANGE",
        /// A configuration value was rejected.
        InvalidConfig => InvalidConfig { .. } => "PARAPROP_INVALID_CONFIG",
        /// A manual override named an unregistered pool.
        UnknownPool => UnknownPool { .. } => "PARAPROP_UNKNOWN_POOL",
        /// A pool registration carried unusable bounds.
        InvalidPoolBounds => InvalidPoolBounds { .. } => "PARAPROP_INVALID_POOL_BOUNDS",
        /// The counterexample persistence collaborator reported a failure.
        Store => Store { .. } => "PARAPROP_STORE",
    }
}

impl ParapropError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn spawn_failed(thread: &str, error: &std::io::Error) -> Self {
        Self::WorkerSpawn {
            thread: thread.to_owned(),
            message: error.to_string(),
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, ParapropError>;

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
