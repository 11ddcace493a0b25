//! Компилятор фильтров топиков с MQTT-семантикой.
//!
//! Топик — последовательность непустых сегментов, разделённых `/`.
//! Фильтр дополнительно допускает:
//! - `+`: ровно один произвольный сегмент;
//! - `#`: ноль или более оставшихся сегментов (только последним).
//!
//! `"foo/#"` совпадает с `"foo"` и со всем, что лежит под `"foo/"`.

use std::{fmt, sync::Arc};

use crate::{PubSubError, PubSubResult};

/// Разделитель сегментов топика.
pub const TOPIC_DELIMITER: char = '/';
/// Подстановка ровно одного сегмента.
pub const WILDCARD_SINGLE: &str = "+";
/// Подстановка хвоста топика (только последним сегментом).
pub const WILDCARD_MULTI: &str = "#";

/// Сегмент скомпилированного фильтра.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Точное совпадение сегмента.
    Literal(Box<str>),
    /// `+`
    Single,
    /// `#`
    Multi,
}

/// Скомпилированный фильтр топиков.
///
/// Неизменяем после компиляции и дёшево клонируется, поэтому один
/// `Matcher` можно использовать из нескольких потоков одновременно.
/// Текстуально разные фильтры — разные матчеры, даже если множества
/// совпадений у них одинаковые (`PartialEq` сравнивает исходный текст).
#[derive(Debug, Clone)]
pub struct Matcher {
    filter: Arc<str>,
    segments: Arc<[Segment]>,
}

impl Matcher {
    /// Компилирует фильтр.
    ///
    /// # Ошибки
    /// `InvalidPattern`, если:
    /// - какой-либо сегмент пуст (включая пустой фильтр, `a//b`, `a/`);
    /// - `#` стоит не последним сегментом;
    /// - `+` или `#` смешаны с другими символами в одном сегменте.
    pub fn compile(filter: &str) -> PubSubResult<Self> {
        let mut segments = Vec::new();
        let mut parts = filter.split(TOPIC_DELIMITER).enumerate().peekable();

        while let Some((position, part)) = parts.next() {
            let segment = match part {
                "" => {
                    return Err(invalid(filter, format!("empty segment at position {position}")));
                }
                WILDCARD_SINGLE => Segment::Single,
                WILDCARD_MULTI => {
                    if parts.peek().is_some() {
                        return Err(invalid(
                            filter,
                            format!("'{WILDCARD_MULTI}' must be the last segment"),
                        ));
                    }
                    Segment::Multi
                }
                literal if literal.contains(['+', '#']) => {
                    return Err(invalid(
                        filter,
                        format!("wildcards must occupy a whole segment, found '{literal}'"),
                    ));
                }
                literal => Segment::Literal(literal.into()),
            };
            segments.push(segment);
        }

        Ok(Self {
            filter: Arc::from(filter),
            segments: segments.into(),
        })
    }

    /// Проверяет, совпадает ли топик с фильтром.
    ///
    /// Чистая функция без побочных эффектов.
    pub fn matches(
        &self,
        topic: &str,
    ) -> bool {
        let mut topic_segments = topic.split(TOPIC_DELIMITER);

        for segment in self.segments.iter() {
            match segment {
                Segment::Multi => return true,
                Segment::Single => {
                    if topic_segments.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => match topic_segments.next() {
                    Some(part) if part == &**literal => {}
                    _ => return false,
                },
            }
        }

        // фильтр исчерпан: совпадение только если исчерпан и топик
        topic_segments.next().is_none()
    }

    /// Исходный текст фильтра.
    pub fn as_str(&self) -> &str {
        &self.filter
    }

    /// Сегменты фильтра.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Есть ли в фильтре `+` или `#`.
    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Single | Segment::Multi))
    }

    /// Литеральный префикс фильтра (сегменты до первой подстановки).
    pub fn literal_prefix(&self) -> Vec<&str> {
        self.segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(literal) => Some(&**literal),
                _ => None,
            })
            .collect()
    }
}

impl PartialEq for Matcher {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.filter == other.filter
    }
}

impl Eq for Matcher {}

impl fmt::Display for Matcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.filter)
    }
}

/// Компилирует фильтр топиков. См. [`Matcher::compile`].
pub fn compile(filter: &str) -> PubSubResult<Matcher> {
    Matcher::compile(filter)
}

/// Проверяет топик скомпилированным фильтром. См. [`Matcher::matches`].
pub fn matches(
    matcher: &Matcher,
    topic: &str,
) -> bool {
    matcher.matches(topic)
}

/// Проверяет топик публикации: непустые сегменты, без `+` и `#`.
pub fn validate_topic(topic: &str) -> PubSubResult<()> {
    for (position, part) in topic.split(TOPIC_DELIMITER).enumerate() {
        if part.is_empty() {
            return Err(invalid(topic, format!("empty segment at position {position}")));
        }
        if part.contains(['+', '#']) {
            return Err(invalid(topic, "wildcards are not allowed in a published topic"));
        }
    }
    Ok(())
}

fn invalid(
    pattern: &str,
    reason: impl Into<String>,
) -> PubSubError {
    PubSubError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}
