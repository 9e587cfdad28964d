//! Планировщик доставки.
//!
//! Копит публикации, сделанные в пределах одного тика, и доставляет их
//! одним отложенным проходом в порядке публикации.
//!
//! ```text
//!            publish ──► enqueue ──┐
//!                                  ▼
//!   ┌──────┐  first enqueue  ┌───────┐  flush()  ┌──────────┐
//!   │ Idle │ ──────────────► │ Armed │ ────────► │ Flushing │
//!   └──────┘                 └───────┘           └────┬─────┘
//!       ▲                                             │
//!       └──────────── queue drained ──────────────────┘
//! ```
//!
//! Публикации, сделанные подписчиками во время прохода, попадают в ту же
//! очередь и доставляются в этом же проходе.
//!
//! При [`FlushStrategy::Spawn`] задача flush создаётся только на
//! current-thread рантайме: там она стартует не раньше, чем издатель отдаст
//! управление. Многопоточный рантайм запустил бы её параллельно с кодом
//! издателя, поэтому там очередь ждёт [`Scheduler::drained`] или
//! [`Scheduler::flush`].

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    sync::watch,
};
use tracing::{debug, trace, warn};

use super::{DeliveryMode, FlushStrategy, SchedulerConfig, Topic};

/// Состояние очереди планировщика.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Очередь пуста, flush не запланирован.
    Idle,
    /// В очереди есть записи, flush запланирован.
    Armed,
    /// Идёт проход доставки.
    Flushing,
}

/// Итог доставки одной записи.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DeliveryReport {
    pub delivered: u64,
    pub failed: u64,
}

/// Отложенная публикация: полезная нагрузка плюс ссылка на живой реестр
/// топика.
pub(crate) trait PendingDelivery: Send + Sync {
    fn topic_name(&self) -> &str;

    /// Доставляет запись текущим подписчикам топика, изолируя ошибки.
    fn deliver(&self) -> DeliveryReport;
}

/// Снимок счётчиков планировщика.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Количество вызовов `publish`.
    pub published: u64,
    /// Успешные вызовы подписчиков.
    pub delivered: u64,
    /// Вызовы подписчиков, завершившиеся паникой или ошибкой.
    pub failed: u64,
    /// Завершённые проходы flush.
    pub flushes: u64,
}

#[derive(Default)]
struct StatsCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    flushes: AtomicU64,
}

impl StatsCounters {
    fn record(
        &self,
        report: DeliveryReport,
    ) {
        self.delivered
            .fetch_add(report.delivered, Ordering::Relaxed);
        self.failed.fetch_add(report.failed, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

struct Queue {
    records: VecDeque<Box<dyn PendingDelivery>>,
    state: SchedulerState,
    /// Номер текущего цикла Idle → Armed; отсекает устаревшие задачи flush.
    epoch: u64,
}

struct SchedulerInner {
    config: SchedulerConfig,
    queue: Mutex<Queue>,
    /// `true`, пока планировщик в `Idle`.
    idle: watch::Sender<bool>,
    stats: StatsCounters,
    /// Предупреждение о многопоточном рантайме уже выдано.
    multi_thread_warned: AtomicBool,
}

/// Планировщик доставки, общий для всех топиков одного брокера.
///
/// Клонирование дешёвое: все клоны разделяют одну очередь.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                queue: Mutex::new(Queue {
                    records: VecDeque::new(),
                    state: SchedulerState::Idle,
                    epoch: 0,
                }),
                idle,
                stats: StatsCounters::default(),
                multi_thread_warned: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.config
    }

    pub fn mode(&self) -> DeliveryMode {
        self.inner.config.mode
    }

    /// Создаёт анонимный топик, привязанный к этому планировщику и не
    /// зарегистрированный ни в одном брокере.
    pub fn topic<T>(&self) -> Topic<T>
    where
        T: Send + Sync + 'static,
    {
        Topic::new(self)
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.queue.lock().state
    }

    /// Число записей, ожидающих доставки.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().records.len()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.inner.stats.snapshot()
    }

    /// Ждёт, пока очередь не опустеет и планировщик не вернётся в `Idle`.
    ///
    /// При [`FlushStrategy::Spawn`] ожидающий уже вышел из синхронного кода
    /// своего тика, поэтому запланированный проход выполняется прямо здесь,
    /// не дожидаясь задачи (на многопоточном рантайме её нет). При
    /// [`FlushStrategy::Manual`] завершится только после вызова
    /// [`flush`](Self::flush).
    pub async fn drained(&self) {
        let mut rx = self.inner.idle.subscribe();
        loop {
            let _ = rx.borrow_and_update();
            if self.inner.config.flush == FlushStrategy::Spawn {
                self.flush();
            }
            if self.state() == SchedulerState::Idle {
                return;
            }
            // Sender живёт вместе с `inner`, поэтому канал не закрывается.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn record_published(&self) {
        self.inner.stats.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report(
        &self,
        report: DeliveryReport,
    ) {
        self.inner.stats.record(report);
    }

    /// Ставит запись в очередь. Первая запись цикла планирует ровно один
    /// flush.
    pub(crate) fn enqueue(
        &self,
        record: Box<dyn PendingDelivery>,
    ) {
        self.record_published();

        let armed_epoch = {
            let mut queue = self.inner.queue.lock();
            trace!(
                topic = record.topic_name(),
                pending = queue.records.len() + 1,
                "publish enqueued"
            );
            queue.records.push_back(record);
            if queue.state == SchedulerState::Idle {
                queue.state = SchedulerState::Armed;
                queue.epoch += 1;
                self.inner.idle.send_replace(false);
                Some(queue.epoch)
            } else {
                None
            }
        };

        if let Some(epoch) = armed_epoch {
            self.arm(epoch);
        }
    }

    fn arm(
        &self,
        epoch: u64,
    ) {
        match self.inner.config.flush {
            FlushStrategy::Manual => {
                trace!(epoch, "flush armed, waiting for manual flush");
            }
            FlushStrategy::Spawn => match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                    trace!(epoch, "flush armed, spawning flush task");
                    let scheduler = self.clone();
                    handle.spawn(async move {
                        scheduler.flush_epoch(epoch);
                    });
                }
                Ok(_) => {
                    if !self.inner.multi_thread_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            epoch,
                            "multi-thread runtime: flush waits for drained() or flush()"
                        );
                    }
                }
                Err(_) => {
                    warn!(
                        epoch,
                        "no tokio runtime available; flush stays armed until flush() is called"
                    );
                }
            },
        }
    }

    /// Выполняет проход доставки, если он запланирован.
    ///
    /// Возвращает количество доставленных записей. Вызов из подписчика во
    /// время прохода ничего не делает и возвращает `0`.
    pub fn flush(&self) -> usize {
        self.run_flush(None)
    }

    fn flush_epoch(
        &self,
        epoch: u64,
    ) -> usize {
        self.run_flush(Some(epoch))
    }

    fn run_flush(
        &self,
        epoch: Option<u64>,
    ) -> usize {
        {
            let mut queue = self.inner.queue.lock();
            if queue.state != SchedulerState::Armed {
                return 0;
            }
            if epoch.is_some_and(|e| e != queue.epoch) {
                // Этот цикл уже доставлен вручную.
                return 0;
            }
            queue.state = SchedulerState::Flushing;
        }

        let mut processed = 0usize;
        let mut total = DeliveryReport::default();
        loop {
            let next = {
                let mut queue = self.inner.queue.lock();
                match queue.records.pop_front() {
                    Some(record) => Some(record),
                    None => {
                        queue.state = SchedulerState::Idle;
                        self.inner.idle.send_replace(true);
                        None
                    }
                }
            };
            let Some(record) = next else {
                break;
            };

            let report = record.deliver();
            self.record_report(report);
            total.delivered += report.delivered;
            total.failed += report.failed;
            processed += 1;
        }

        self.inner.stats.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(
            records = processed,
            delivered = total.delivered,
            failed = total.failed,
            "flush completed"
        );
        processed
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let queue = self.inner.queue.lock();
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("state", &queue.state)
            .field("pending", &queue.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Запись, которая пишет свою метку в общий журнал.
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PendingDelivery for Recorder {
        fn topic_name(&self) -> &str {
            "recorder"
        }

        fn deliver(&self) -> DeliveryReport {
            self.log.lock().push(self.label);
            DeliveryReport {
                delivered: 1,
                failed: 0,
            }
        }
    }

    fn recorder(
        label: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<dyn PendingDelivery> {
        Box::new(Recorder {
            label,
            log: log.clone(),
        })
    }

    /// Тест проверяет переходы Idle → Armed → Idle и порядок доставки.
    #[test]
    fn test_state_machine_manual() {
        let scheduler = Scheduler::new(SchedulerConfig::manual());
        let log = Arc::new(Mutex::new(Vec::new()));

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.flush(), 0);

        scheduler.enqueue(recorder("a", &log));
        scheduler.enqueue(recorder("b", &log));
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        assert_eq!(scheduler.pending(), 2);
        assert!(log.lock().is_empty());

        assert_eq!(scheduler.flush(), 2);
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.pending(), 0);

        let stats = scheduler.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.flushes, 1);
    }

    /// Тест проверяет, что устаревшая задача flush не трогает новый цикл.
    #[test]
    fn test_stale_epoch_is_ignored() {
        let scheduler = Scheduler::new(SchedulerConfig::manual());
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(recorder("first", &log));
        scheduler.flush();
        scheduler.enqueue(recorder("second", &log));

        assert_eq!(scheduler.flush_epoch(1), 0);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.flush_epoch(2), 1);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    /// Тест проверяет, что без рантайма `Spawn` оставляет flush
    /// запланированным до ручного вызова.
    #[test]
    fn test_spawn_without_runtime_stays_armed() {
        let scheduler = Scheduler::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(recorder("x", &log));
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        assert_eq!(scheduler.flush(), 1);
        assert_eq!(*log.lock(), vec!["x"]);
    }

    /// Тест проверяет, что `Spawn` доставляет задачей на следующем тике
    /// current-thread рантайма, а не синхронно.
    #[tokio::test]
    async fn test_spawn_flushes_on_next_tick() {
        let scheduler = Scheduler::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(recorder("a", &log));
        scheduler.enqueue(recorder("b", &log));
        assert!(log.lock().is_empty());

        tokio::task::yield_now().await;
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.stats().flushes, 1);
    }

    /// Тест проверяет, что на многопоточном рантайме задача flush не
    /// создаётся: доставка ждёт `drained`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_on_multi_thread_waits_for_drained() {
        let scheduler = Scheduler::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(recorder("a", &log));
        tokio::task::yield_now().await;
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(log.lock().is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Armed);

        scheduler.drained().await;
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    /// Тест проверяет, что `drained` сразу завершается в `Idle`.
    #[tokio::test]
    async fn test_drained_when_idle() {
        let scheduler = Scheduler::new(SchedulerConfig::manual());
        scheduler.drained().await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
