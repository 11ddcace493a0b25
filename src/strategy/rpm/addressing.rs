//! Перевод топиков и фильтров в адресацию конкретного брокера и обратно.
//!
//! Нативные шаблоны подписки могут быть шире исходного фильтра (glob
//! Redis не различает границы сегментов), поэтому адаптер обязан
//! перепроверять входящий топик через [`Matcher::matches`].

use super::Backend;
use crate::{
    pubsub::{Matcher, Segment, TOPIC_DELIMITER},
    PubSubError, PubSubResult,
};

/// Разделитель пространства имён и топика у каждого брокера.
pub fn scope_separator(backend: Backend) -> &'static str {
    match backend {
        Backend::Mqtt => "/",
        Backend::Redis => ":",
        Backend::Nats => ".",
        Backend::Pgsql => "",
    }
}

/// Префикс пространства имён (`app/`, `app:`, `app.`).
///
/// `pgsql` не поддерживает пространства имён: префикс всегда пуст.
pub fn scope_prefix(
    backend: Backend,
    scope: Option<&str>,
) -> String {
    match scope {
        Some(scope) if backend != Backend::Pgsql => {
            format!("{scope}{}", scope_separator(backend))
        }
        _ => String::new(),
    }
}

/// Нативное имя канала для публикации в топик.
pub fn native_channel(
    backend: Backend,
    scope: Option<&str>,
    topic: &str,
) -> String {
    let prefix = scope_prefix(backend, scope);
    match backend {
        Backend::Mqtt | Backend::Redis => format!("{prefix}{topic}"),
        Backend::Nats => format!("{prefix}{}", topic.replace(TOPIC_DELIMITER, ".")),
        Backend::Pgsql => topic.replace(TOPIC_DELIMITER, "-"),
    }
}

/// Нативные шаблоны подписки для фильтра.
///
/// Завершающий `#` совпадает и с родительским топиком, поэтому для
/// Redis и NATS дополнительно возвращается шаблон родителя.
///
/// # Ошибки
/// `InvalidPattern` для `pgsql`, если фильтр содержит подстановки:
/// LISTEN/NOTIFY поддерживает только точные имена каналов.
pub fn native_filter(
    backend: Backend,
    scope: Option<&str>,
    matcher: &Matcher,
) -> PubSubResult<Vec<String>> {
    let prefix = scope_prefix(backend, scope);
    match backend {
        Backend::Mqtt => Ok(vec![format!("{prefix}{}", matcher.as_str())]),
        Backend::Redis => Ok(translate(matcher, &prefix, "/", "*", "*")),
        Backend::Nats => Ok(translate(matcher, &prefix, ".", "*", ">")),
        Backend::Pgsql => {
            if matcher.has_wildcards() {
                return Err(PubSubError::InvalidPattern {
                    pattern: matcher.as_str().to_string(),
                    reason: "PostgreSQL LISTEN/NOTIFY does not support wildcard channels"
                        .to_string(),
                });
            }
            Ok(vec![matcher.as_str().replace(TOPIC_DELIMITER, "-")])
        }
    }
}

/// Обратный перевод нативного имени канала в топик.
///
/// Для `pgsql` перевод неоднозначен (`-` внутри сегмента тоже станет
/// разделителем); адаптеру лучше отдавать подписчику исходный фильтр.
pub fn topic_from_native(
    backend: Backend,
    scope: Option<&str>,
    native: &str,
) -> String {
    let prefix = scope_prefix(backend, scope);
    let unscoped = native.strip_prefix(prefix.as_str()).unwrap_or(native);
    match backend {
        Backend::Mqtt | Backend::Redis => unscoped.to_string(),
        Backend::Nats => unscoped.replace('.', "/"),
        Backend::Pgsql => unscoped.replace('-', "/"),
    }
}

fn translate(
    matcher: &Matcher,
    prefix: &str,
    delimiter: &str,
    single: &str,
    multi: &str,
) -> Vec<String> {
    let parts: Vec<&str> = matcher
        .segments()
        .iter()
        .map(|segment| match segment {
            Segment::Literal(literal) => &**literal,
            Segment::Single => single,
            Segment::Multi => multi,
        })
        .collect();

    let mut patterns = vec![format!("{prefix}{}", parts.join(delimiter))];
    if matches!(matcher.segments().last(), Some(Segment::Multi)) && parts.len() > 1 {
        let parent = &parts[..parts.len() - 1];
        patterns.push(format!("{prefix}{}", parent.join(delimiter)));
    }
    patterns
}
