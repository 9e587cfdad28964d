use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Пул для повторного использования `Arc<str>` по одинаковым именам топиков.
///
/// Общий для всех брокеров процесса. Имя освобождается через
/// [`release_topic_name`], когда брокер удаляет топик или уничтожается сам и
/// на имя больше никто не ссылается. Имя топика, дескрипторы которого
/// пережили брокер, остаётся в пуле.
static TOPIC_NAMES: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned `Arc<str>` для имени топика.
/// При первом вызове для нового имени создаёт `Arc<str>` и сохраняет его в
/// пуле.
#[inline(always)]
pub(crate) fn intern_topic_name<S: AsRef<str>>(name: S) -> Arc<str> {
    let key = name.as_ref();
    if let Some(existing) = TOPIC_NAMES.get(key) {
        return existing.value().clone();
    }
    TOPIC_NAMES
        .entry(key.to_string())
        .or_insert_with(|| Arc::from(key))
        .value()
        .clone()
}

/// Убирает имя из пула, если кроме пула на него ссылается только `name`.
pub(crate) fn release_topic_name(name: Arc<str>) -> bool {
    TOPIC_NAMES
        .remove_if(name.as_ref(), |_, pooled| {
            Arc::ptr_eq(pooled, &name) && Arc::strong_count(pooled) == 2
        })
        .is_some()
}

#[cfg(test)]
pub(crate) fn is_interned(name: &str) -> bool {
    TOPIC_NAMES.contains_key(name)
}
