use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

/// Счётчик идентификаторов, уникальных в пределах процесса.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Непрозрачный идентификатор подписчика.
///
/// Выдаётся при каждой подписке. Его же можно получить заранее через
/// [`SubscriberId::next`] и передать в
/// [`Topic::subscribe_as`](super::Topic::subscribe_as): повторная подписка с
/// тем же идентификатором заменяет обработчик, а не дублирует его.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Выдаёт новый идентификатор.
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

pub(crate) type Callback<T> = Box<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Обёртка вокруг колбэка подписчика.
///
/// Контекст (если был передан) уже захвачен замыканием. Для одноразовой
/// подписки доставка сначала удаляет обёртку из реестра и вызывает колбэк
/// только если удаление удалось.
pub(crate) struct Receiver<T> {
    callback: Callback<T>,
    once: bool,
}

impl<T> Receiver<T> {
    pub(crate) fn persistent(callback: Callback<T>) -> Arc<Self> {
        Arc::new(Self {
            callback,
            once: false,
        })
    }

    pub(crate) fn once(callback: Callback<T>) -> Arc<Self> {
        Arc::new(Self {
            callback,
            once: true,
        })
    }

    pub(crate) fn is_once(&self) -> bool {
        self.once
    }

    pub(crate) fn call(
        &self,
        payload: &T,
    ) -> anyhow::Result<()> {
        (self.callback)(payload)
    }
}

/// Удаление подписчика по идентификатору, без знания типа сообщений топика.
pub(crate) trait Unsubscribe: Send + Sync {
    fn remove(
        &self,
        id: SubscriberId,
    ) -> bool;

    fn contains(
        &self,
        id: SubscriberId,
    ) -> bool;
}

/// Регистрация подписчика на топике.
///
/// Подписка живёт, пока её явно не отменят: удаление самого `Subscription`
/// ничего не отписывает. Для отписки при `Drop` есть
/// [`Subscription::into_guard`].
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    topic: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        topic: Weak<dyn Unsubscribe>,
    ) -> Self {
        Self { id, topic }
    }

    /// Идентификатор подписчика.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Отписывает этот идентификатор от топика.
    ///
    /// # Возвращает
    /// - `true`, если запись была в реестре и удалена
    /// - `false` при повторном вызове, после срабатывания одноразовой
    ///   подписки или если топик уже уничтожен
    pub fn unsubscribe(&self) -> bool {
        self.topic
            .upgrade()
            .is_some_and(|topic| topic.remove(self.id))
    }

    /// Проверяет, зарегистрирован ли ещё подписчик.
    pub fn is_active(&self) -> bool {
        self.topic
            .upgrade()
            .is_some_and(|topic| topic.contains(self.id))
    }

    /// Превращает подписку в guard, который отписывается при `Drop`.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard { inner: Some(self) }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Подписка, которая отменяется автоматически при `Drop`.
#[derive(Debug)]
pub struct SubscriptionGuard {
    inner: Option<Subscription>,
}

impl SubscriptionGuard {
    pub fn id(&self) -> Option<SubscriberId> {
        self.inner.as_ref().map(Subscription::id)
    }

    /// Возвращает подписку без отписки.
    pub fn disarm(mut self) -> Option<Subscription> {
        self.inner.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(sub) = self.inner.take() {
            sub.unsubscribe();
        }
    }
}
