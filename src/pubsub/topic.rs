use std::{
    any::{type_name, Any},
    fmt,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use topicbus_error::{ErrorExt, SubscriberError};
use tracing::{error, trace};

use super::{
    intern_topic_name, Callback, DeliveryMode, DeliveryReport, PendingDelivery, Receiver,
    Scheduler, SubscriberId, SubscriberRegistry, Subscription, Unsubscribe,
};

/// Имя анонимных топиков, созданных вне брокера.
pub const ANONYMOUS_TOPIC: &str = "<anonymous>";

/// Состояние топика: имя, реестр подписчиков и планировщик доставки.
pub(crate) struct TopicCore<T> {
    name: Arc<str>,
    registry: SubscriberRegistry<T>,
    scheduler: Scheduler,
}

impl<T> TopicCore<T>
where
    T: Send + Sync + 'static,
{
    fn new(
        name: Arc<str>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            name,
            registry: SubscriberRegistry::new(),
            scheduler,
        }
    }

    /// Забирает право на вызов обёртки перед доставкой.
    ///
    /// Одноразовая обёртка удаляет себя из реестра и срабатывает, только если
    /// удаление удалось. Постоянная должна всё ещё быть зарегистрирована.
    fn claim(
        &self,
        id: SubscriberId,
        receiver: &Arc<Receiver<T>>,
    ) -> bool {
        if receiver.is_once() {
            self.registry.remove_entry(id, receiver)
        } else {
            self.registry.is_current(id, receiver)
        }
    }

    /// Доставка с изоляцией: паника или ошибка одного подписчика логируется
    /// и не мешает остальным.
    fn deliver_isolated(
        &self,
        payload: &T,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for (id, receiver) in self.registry.snapshot() {
            if !self.claim(id, &receiver) {
                continue;
            }
            let failure = match catch_unwind(AssertUnwindSafe(|| receiver.call(payload))) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(SubscriberError::Failed {
                    topic: self.name.clone(),
                    subscriber: id.as_u64(),
                    reason: format!("{err:#}"),
                }),
                Err(panic) => Some(SubscriberError::from_panic(
                    self.name.clone(),
                    id.as_u64(),
                    panic.as_ref(),
                )),
            };
            match failure {
                None => report.delivered += 1,
                Some(err) => {
                    error!(
                        topic = %self.name,
                        subscriber = %id,
                        status = %err.status_code(),
                        error = %err,
                        "subscriber invocation failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Синхронная доставка без изоляции: первая ошибка прерывает проход,
    /// паника уходит к вызывающему. Статистика учитывается в обоих случаях.
    fn deliver_strict(
        &self,
        payload: &T,
    ) -> Result<DeliveryReport, SubscriberError> {
        let mut report = DeliveryReport::default();
        for (id, receiver) in self.registry.snapshot() {
            if !self.claim(id, &receiver) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| receiver.call(payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    self.scheduler.record_report(report);
                    return Err(SubscriberError::Failed {
                        topic: self.name.clone(),
                        subscriber: id.as_u64(),
                        reason: format!("{err:#}"),
                    });
                }
                Err(panic) => {
                    report.failed += 1;
                    self.scheduler.record_report(report);
                    resume_unwind(panic);
                }
            }
        }
        self.scheduler.record_report(report);
        Ok(report)
    }
}

impl<T> Unsubscribe for TopicCore<T>
where
    T: Send + Sync + 'static,
{
    fn remove(
        &self,
        id: SubscriberId,
    ) -> bool {
        self.registry.remove(id)
    }

    fn contains(
        &self,
        id: SubscriberId,
    ) -> bool {
        self.registry.contains(id)
    }
}

/// Топик без знания типа сообщений: то, что нужно брокеру.
pub(crate) trait AnyTopic: Send + Sync {
    fn unsubscribe_all(&self) -> usize;

    fn payload_type(&self) -> &'static str;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> AnyTopic for TopicCore<T>
where
    T: Send + Sync + 'static,
{
    fn unsubscribe_all(&self) -> usize {
        self.registry.clear()
    }

    fn payload_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Отложенная публикация одного сообщения.
///
/// Держит топик по `Weak`: очередь планировщика не продлевает жизнь топика,
/// иначе `Scheduler → очередь → топик → Scheduler` образует цикл. Запись
/// топика, от которого не осталось ни одного дескриптора, отбрасывается.
struct Pending<T> {
    name: Arc<str>,
    core: Weak<TopicCore<T>>,
    payload: T,
}

impl<T> PendingDelivery for Pending<T>
where
    T: Send + Sync + 'static,
{
    fn topic_name(&self) -> &str {
        &self.name
    }

    fn deliver(&self) -> DeliveryReport {
        match self.core.upgrade() {
            Some(core) => core.deliver_isolated(&self.payload),
            None => {
                trace!(topic = %self.name, "topic dropped, record discarded");
                DeliveryReport::default()
            }
        }
    }
}

/// Дескриптор топика.
///
/// Клоны ссылаются на один и тот же реестр подписчиков. Тип `T` задаёт полезную
/// нагрузку одной публикации: одиночное значение, кортеж или структура.
pub struct Topic<T> {
    core: Arc<TopicCore<T>>,
}

impl<T> Topic<T>
where
    T: Send + Sync + 'static,
{
    /// Создаёт анонимный топик на заданном планировщике.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self::named(intern_topic_name(ANONYMOUS_TOPIC), scheduler.clone())
    }

    pub(crate) fn named(
        name: Arc<str>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            core: Arc::new(TopicCore::new(name, scheduler)),
        }
    }

    pub(crate) fn from_core(core: Arc<TopicCore<T>>) -> Self {
        Self { core }
    }

    pub(crate) fn erased(&self) -> Arc<dyn AnyTopic> {
        self.core.clone()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.core.scheduler
    }

    /// Публикует сообщение.
    ///
    /// В режиме [`DeliveryMode::Deferred`] сообщение ставится в очередь и
    /// будет доставлено тем, кто подписан на момент flush. В режиме
    /// [`DeliveryMode::Immediate`] доставка идёт сразу; ошибка подписчика
    /// прерывает её и логируется, паника уходит к вызывающему.
    pub fn publish(
        &self,
        payload: T,
    ) {
        if let Err(err) = self.try_publish(payload) {
            error!(
                topic = %self.core.name,
                status = %err.status_code(),
                error = %err,
                "immediate delivery aborted"
            );
        }
    }

    /// То же, что [`publish`](Self::publish), но в режиме
    /// [`DeliveryMode::Immediate`] возвращает первую ошибку подписчика.
    ///
    /// В отложенном режиме всегда возвращает `Ok(())`.
    pub fn try_publish(
        &self,
        payload: T,
    ) -> Result<(), SubscriberError> {
        match self.core.scheduler.mode() {
            DeliveryMode::Deferred => {
                self.core.scheduler.enqueue(Box::new(Pending {
                    name: self.core.name.clone(),
                    core: Arc::downgrade(&self.core),
                    payload,
                }));
                Ok(())
            }
            DeliveryMode::Immediate => {
                self.core.scheduler.record_published();
                self.core.deliver_strict(&payload).map(|_| ())
            }
        }
    }

    fn register(
        &self,
        id: SubscriberId,
        receiver: Arc<Receiver<T>>,
    ) -> Subscription {
        self.core.registry.insert(id, receiver);
        let erased: Arc<dyn Unsubscribe> = self.core.clone();
        Subscription::new(id, Arc::downgrade(&erased))
    }

    fn infallible<F>(callback: F) -> Callback<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Box::new(move |payload| {
            callback(payload);
            Ok(())
        })
    }

    /// Подписывает колбэк на все последующие публикации.
    pub fn subscribe<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(
            SubscriberId::next(),
            Receiver::persistent(Self::infallible(callback)),
        )
    }

    /// Подписка с контекстом: `ctx` передаётся колбэку первым аргументом при
    /// каждом вызове.
    pub fn subscribe_with<C, F>(
        &self,
        ctx: C,
        callback: F,
    ) -> Subscription
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &T) + Send + Sync + 'static,
    {
        self.subscribe(move |payload| callback(&ctx, payload))
    }

    /// Подписка, которая срабатывает не более одного раза.
    ///
    /// Запись удаляется из реестра до вызова колбэка, поэтому повторная
    /// публикация изнутри колбэка его уже не достанет.
    pub fn subscribe_once<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(
            SubscriberId::next(),
            Receiver::once(Self::infallible(callback)),
        )
    }

    pub fn subscribe_once_with<C, F>(
        &self,
        ctx: C,
        callback: F,
    ) -> Subscription
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &T) + Send + Sync + 'static,
    {
        self.subscribe_once(move |payload| callback(&ctx, payload))
    }

    /// Подписка с колбэком, который может вернуть ошибку. Ошибка
    /// обрабатывается так же, как паника подписчика.
    pub fn try_subscribe<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(SubscriberId::next(), Receiver::persistent(Box::new(callback)))
    }

    /// Подписка под заданным идентификатором.
    ///
    /// Если `id` уже подписан, обработчик заменяется на прежнем месте в
    /// порядке доставки, дубликат не создаётся.
    pub fn subscribe_as<F>(
        &self,
        id: SubscriberId,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(id, Receiver::persistent(Self::infallible(callback)))
    }

    /// Отписывает идентификатор. Возвращает `true`, если он был подписан.
    pub fn unsubscribe(
        &self,
        id: SubscriberId,
    ) -> bool {
        self.core.registry.remove(id)
    }

    /// Отписывает всех подписчиков топика.
    pub fn unsubscribe_all(&self) {
        let removed = self.core.registry.clear();
        tracing::debug!(topic = %self.core.name, removed, "unsubscribed all");
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.registry.len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// `true`, если оба дескриптора указывают на один и тот же топик.
    pub fn ptr_eq(
        a: &Self,
        b: &Self,
    ) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.core.name)
            .field("subscribers", &self.core.registry.len())
            .finish()
    }
}
