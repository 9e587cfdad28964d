use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Receiver, SubscriberId};

type Entry<T> = (SubscriberId, Arc<Receiver<T>>);

struct RegistryState<T> {
    /// Порядок вставки → запись.
    slots: BTreeMap<u64, Entry<T>>,
    /// Идентификатор → позиция в `slots`.
    index: FxHashMap<SubscriberId, u64>,
    next_seq: u64,
}

/// Реестр подписчиков одного топика.
///
/// Отображение `SubscriberId → Receiver`, упорядоченное по первой вставке.
/// Повторная вставка того же идентификатора заменяет обёртку на прежнем
/// месте. Блокировка никогда не удерживается во время вызова колбэков:
/// доставка работает со снимком, а перед каждым вызовом сверяется с живым
/// состоянием через [`is_current`](Self::is_current) /
/// [`remove_entry`](Self::remove_entry).
pub(crate) struct SubscriberRegistry<T> {
    state: Mutex<RegistryState<T>>,
}

impl<T> SubscriberRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                slots: BTreeMap::new(),
                index: FxHashMap::default(),
                next_seq: 0,
            }),
        }
    }

    /// Регистрирует обёртку. Возвращает `true`, если заменила существующую.
    pub(crate) fn insert(
        &self,
        id: SubscriberId,
        receiver: Arc<Receiver<T>>,
    ) -> bool {
        let mut state = self.state.lock();
        if let Some(&seq) = state.index.get(&id) {
            state.slots.insert(seq, (id, receiver));
            return true;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.index.insert(id, seq);
        state.slots.insert(seq, (id, receiver));
        false
    }

    pub(crate) fn remove(
        &self,
        id: SubscriberId,
    ) -> bool {
        let mut state = self.state.lock();
        match state.index.remove(&id) {
            Some(seq) => state.slots.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Удаляет запись, только если под `id` всё ещё лежит именно эта обёртка.
    pub(crate) fn remove_entry(
        &self,
        id: SubscriberId,
        receiver: &Arc<Receiver<T>>,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(&seq) = state.index.get(&id) else {
            return false;
        };
        let same = state
            .slots
            .get(&seq)
            .is_some_and(|(_, current)| Arc::ptr_eq(current, receiver));
        if same {
            state.index.remove(&id);
            state.slots.remove(&seq);
        }
        same
    }

    /// Проверяет, что под `id` зарегистрирована именно эта обёртка.
    pub(crate) fn is_current(
        &self,
        id: SubscriberId,
        receiver: &Arc<Receiver<T>>,
    ) -> bool {
        let state = self.state.lock();
        state
            .index
            .get(&id)
            .and_then(|seq| state.slots.get(seq))
            .is_some_and(|(_, current)| Arc::ptr_eq(current, receiver))
    }

    pub(crate) fn contains(
        &self,
        id: SubscriberId,
    ) -> bool {
        self.state.lock().index.contains_key(&id)
    }

    /// Очищает реестр, возвращает число удалённых записей.
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.slots.len();
        state.slots.clear();
        state.index.clear();
        removed
    }

    /// Снимок записей в порядке вставки.
    pub(crate) fn snapshot(&self) -> Vec<Entry<T>> {
        self.state
            .lock()
            .slots
            .values()
            .map(|(id, receiver)| (*id, Arc::clone(receiver)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<Receiver<u32>> {
        Receiver::persistent(Box::new(|_| Ok(())))
    }

    fn ids(registry: &SubscriberRegistry<u32>) -> Vec<SubscriberId> {
        registry.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    /// Тест проверяет, что снимок сохраняет порядок вставки.
    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let registry = SubscriberRegistry::new();
        let (a, b, c) = (SubscriberId::next(), SubscriberId::next(), SubscriberId::next());
        registry.insert(b, noop());
        registry.insert(a, noop());
        registry.insert(c, noop());

        assert_eq!(ids(&registry), vec![b, a, c]);
        assert_eq!(registry.len(), 3);
    }

    /// Тест проверяет, что повторная вставка заменяет обёртку на прежнем
    /// месте и не создаёт дубликат.
    #[test]
    fn test_reinsert_replaces_in_place() {
        let registry = SubscriberRegistry::new();
        let (a, b) = (SubscriberId::next(), SubscriberId::next());
        let first = noop();
        assert!(!registry.insert(a, first.clone()));
        registry.insert(b, noop());

        let second = noop();
        assert!(registry.insert(a, second.clone()));

        assert_eq!(ids(&registry), vec![a, b]);
        assert!(!registry.is_current(a, &first));
        assert!(registry.is_current(a, &second));
    }

    /// Тест проверяет, что `remove_entry` не трогает заменённую обёртку.
    #[test]
    fn test_remove_entry_requires_same_receiver() {
        let registry = SubscriberRegistry::new();
        let id = SubscriberId::next();
        let stale = noop();
        registry.insert(id, stale.clone());
        let fresh = noop();
        registry.insert(id, fresh.clone());

        assert!(!registry.remove_entry(id, &stale));
        assert!(registry.contains(id));
        assert!(registry.remove_entry(id, &fresh));
        assert!(!registry.contains(id));
        assert!(!registry.remove_entry(id, &fresh));
    }

    /// Тест проверяет `remove` и `clear`.
    #[test]
    fn test_remove_and_clear() {
        let registry = SubscriberRegistry::new();
        let (a, b) = (SubscriberId::next(), SubscriberId::next());
        registry.insert(a, noop());
        registry.insert(b, noop());

        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert_eq!(ids(&registry), vec![b]);

        assert_eq!(registry.clear(), 1);
        assert_eq!(registry.len(), 0);
        assert!(registry.snapshot().is_empty());
    }

    /// Тест проверяет, что удалённый и снова добавленный id встаёт в конец.
    #[test]
    fn test_resubscribe_after_remove_goes_last() {
        let registry = SubscriberRegistry::new();
        let (a, b) = (SubscriberId::next(), SubscriberId::next());
        registry.insert(a, noop());
        registry.insert(b, noop());
        registry.remove(a);
        registry.insert(a, noop());

        assert_eq!(ids(&registry), vec![b, a]);
    }
}
