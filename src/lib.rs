//! `topicbus`: внутрипроцессная шина сообщений с отложенной доставкой.
//!
//! Публикация в [`Topic`] не вызывает подписчиков сразу: сообщение ставится
//! в общую очередь [`Scheduler`] и доставляется одним проходом позже.
//! Публикации, сделанные в пределах одного тика, доставляются в порядке
//! вызова `publish`, в том числе между разными топиками.

/// Settings loading (scheduler and logging sections).
pub mod config;
/// Error types: delivery, topic lookup, logging.
pub mod error;
/// Structured logging setup.
pub mod logging;
/// Pub/Sub: Broker, Topic, Scheduler, Subscription.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use self::config::Settings;
/// Operation errors and result types.
pub use error::{ErrorExt, LoggingError, StatusCode, SubscriberError, TopicError, TopicResult};
/// Logging setup.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Pub/Sub API.
pub use pubsub::{
    Broker, DeliveryMode, DeliveryStats, FlushStrategy, Scheduler, SchedulerConfig,
    SchedulerState, SubscriberId, Subscription, SubscriptionGuard, Topic, ANONYMOUS_TOPIC,
};
