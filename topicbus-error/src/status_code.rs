use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde")]
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки топиков
/// - 3xxx: Ошибки доставки (подписчики)
/// - 4xxx: Конфигурация
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde").
#[cfg_attr(feature = "serde", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 1xxx: Общие ошибки ===
    Unexpected = 1002,
    Internal = 1003,

    // === 2xxx: Топики ===
    TopicTypeMismatch = 2001,

    // === 3xxx: Доставка ===
    SubscriberPanicked = 3000,
    SubscriberFailed = 3001,

    // === 4xxx: Конфигурация ===
    InvalidConfig = 4000,
}

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}
