use serde::{Deserialize, Serialize};

/// Режим доставки сообщений планировщиком.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Публикации копятся в очереди и доставляются одним проходом на
    /// следующем тике. Ошибки подписчиков изолируются и логируются.
    #[default]
    Deferred,
    /// Синхронная доставка снимку подписчиков прямо в `publish`. Первая
    /// ошибка прерывает доставку, паника уходит к издателю.
    Immediate,
}

/// Как запускается отложенный flush после перехода Idle → Armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushStrategy {
    /// Одна задача `tokio` на текущем рантайме.
    #[default]
    Spawn,
    /// Владелец сам вызывает [`Scheduler::flush`](super::Scheduler::flush)
    /// раз за тик своего цикла.
    Manual,
}

/// Конфигурация планировщика доставки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: DeliveryMode,
    pub flush: FlushStrategy,
}

impl SchedulerConfig {
    /// Отложенная доставка с ручным flush (для циклов без async-рантайма).
    pub fn manual() -> Self {
        Self {
            mode: DeliveryMode::Deferred,
            flush: FlushStrategy::Manual,
        }
    }

    /// Синхронная доставка без очереди.
    pub fn immediate() -> Self {
        Self {
            mode: DeliveryMode::Immediate,
            ..Self::default()
        }
    }

    pub fn with_mode(
        mut self,
        mode: DeliveryMode,
    ) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_flush(
        mut self,
        flush: FlushStrategy,
    ) -> Self {
        self.flush = flush;
        self
    }
}
