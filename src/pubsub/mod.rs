//! Внутрипроцессный publish–subscribe.
//!
//! - `broker`: реестр именованных топиков (lookup-or-create) и глобальная
//!   отписка.
//! - `topic`: дескриптор топика: публикация, подписки, отписка.
//! - `scheduler`: очередь отложенной доставки, один flush на тик.
//! - `subscriber`: идентификаторы подписчиков и дескрипторы подписок.
//! - `registry` (приватный): упорядоченный реестр подписчиков топика.
//! - `intern` (приватный): пул имён топиков.
//! - `config`: режим доставки и способ запуска flush.

pub mod broker;
pub mod config;
mod intern;
mod registry;
pub mod scheduler;
pub mod subscriber;
pub mod topic;

pub use broker::*;
pub use self::config::*;
pub(crate) use intern::{intern_topic_name, release_topic_name};
pub(crate) use registry::SubscriberRegistry;
pub(crate) use scheduler::{DeliveryReport, PendingDelivery};
pub use scheduler::{DeliveryStats, Scheduler, SchedulerState};
pub(crate) use subscriber::{Callback, Receiver, Unsubscribe};
pub use subscriber::{SubscriberId, Subscription, SubscriptionGuard};
pub(crate) use topic::AnyTopic;
pub use topic::{Topic, ANONYMOUS_TOPIC};
