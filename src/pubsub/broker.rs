use std::{any::type_name, sync::Arc};

use dashmap::DashMap;
use topicbus_error::TopicError;
use tracing::debug;

use super::{
    intern_topic_name, release_topic_name, topic::TopicCore, AnyTopic, Scheduler,
    SchedulerConfig, Topic,
};
use crate::config::Settings;

type TopicKey = Arc<str>;

/// Реестр именованных топиков.
///
/// Поддерживает:
/// - Ленивое создание топика при первом обращении по имени
/// - Один и тот же дескриптор на каждый вызов `topic(name)`
/// - Глобальную отписку всех подписчиков всех топиков
///
/// Все топики брокера делят один [`Scheduler`], поэтому публикации в разные
/// топики в пределах тика доставляются в порядке вызова `publish`.
pub struct Broker {
    topics: DashMap<TopicKey, Arc<dyn AnyTopic>>,
    scheduler: Scheduler,
}

impl Broker {
    /// Создаёт брокер с планировщиком по умолчанию (отложенная доставка,
    /// flush задачей `tokio`).
    pub fn new() -> Self {
        Self::with_scheduler(Scheduler::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_scheduler(Scheduler::new(config))
    }

    pub fn with_scheduler(scheduler: Scheduler) -> Self {
        Self {
            topics: DashMap::new(),
            scheduler,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_config(settings.scheduler)
    }

    /// Возвращает топик по имени, создавая его при первом обращении.
    ///
    /// # Ошибки
    /// [`TopicError::TypeMismatch`], если топик с этим именем уже создан с
    /// другим типом сообщений.
    pub fn topic<T>(
        &self,
        name: &str,
    ) -> Result<Topic<T>, TopicError>
    where
        T: Send + Sync + 'static,
    {
        let erased = self
            .topics
            .entry(intern_topic_name(name))
            .or_insert_with(|| {
                debug!(topic = name, payload = type_name::<T>(), "topic created");
                Topic::<T>::named(intern_topic_name(name), self.scheduler.clone()).erased()
            })
            .value()
            .clone();

        let actual = erased.payload_type();
        erased
            .into_any()
            .downcast::<TopicCore<T>>()
            .map(Topic::from_core)
            .map_err(|_| TopicError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
                actual,
            })
    }

    pub fn contains_topic(
        &self,
        name: &str,
    ) -> bool {
        self.topics.contains_key(name)
    }

    /// Убирает топик из брокера.
    ///
    /// Уже выданные дескрипторы продолжают работать, но следующий
    /// `topic(name)` создаст новый топик. Если дескрипторов не осталось,
    /// имя освобождается в пуле имён.
    pub fn remove_topic(
        &self,
        name: &str,
    ) -> bool {
        match self.topics.remove(name) {
            Some((key, topic)) => {
                drop(topic);
                release_topic_name(key);
                true
            }
            None => false,
        }
    }

    /// Отписывает всех подписчиков во всех топиках брокера.
    pub fn unsubscribe_all(&self) {
        let removed: usize = self
            .topics
            .iter()
            .map(|entry| entry.value().unsubscribe_all())
            .sum();
        debug!(topics = self.topics.len(), removed, "unsubscribed all topics");
    }

    /// Имена всех топиков в лексикографическом порядке.
    pub fn topic_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Ручной flush общего планировщика.
    pub fn flush(&self) -> usize {
        self.scheduler.flush()
    }

    /// Ждёт, пока все отложенные публикации не будут доставлены.
    pub async fn settled(&self) {
        self.scheduler.drained().await
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        let names: Vec<TopicKey> = self.topics.iter().map(|e| e.key().clone()).collect();
        self.topics.clear();
        for name in names {
            release_topic_name(name);
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("topics", &self.topic_names())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
