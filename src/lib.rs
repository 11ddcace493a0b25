/// Settings loaded from defaults and `IPC_PUBSUB_*` environment variables.
pub mod config;
/// Strategy selection from a connection descriptor.
pub mod facade;
/// Structured logging on top of `tracing`.
pub mod logging;
/// Pub/Sub core: pattern matching, local router, subscriptions.
pub mod pubsub;
/// Delivery strategies: in-process, process group, remote brokers.
pub mod strategy;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Error types, status codes and helper macros.
pub use ipc_pubsub_error::{
    bail, context, ensure, Category, ChannelError, ErrorExt, FailedRecipient, GenericError,
    LogLevel, PubSubError, PubSubResult, ResultExt, StackError, StackResult, StatusCode,
};

/// Configuration.
pub use config::Settings;
/// Facade: the single entry point.
pub use facade::{Descriptor, PubSub, PubSubBuilder};
/// Logging initialization.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Pub/Sub core types.
pub use pubsub::{
    compile, forward_to, handler, matches, Handler, HandlerFailure, HandlerResult, Matcher,
    Message, Subscription, SubscriptionId,
};
/// Strategies and their building blocks.
pub use strategy::{
    mpm::{memory_pair, MemoryChannel, ProcessChannel, ProcessRole, WorkerSet},
    rpm::{Backend, Connectors, RemoteDescriptor},
    InProcess, ProcessGroup, Strategy,
};
