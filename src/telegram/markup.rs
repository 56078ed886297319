//! MarkdownV2 message formatting

use super::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use crate::db::{HistoryRecord, ViewCount};
use crate::movie::MovieDetails;
use crate::providers::WatchLinks;
use crate::runtime::{CallbackAction, Notice};
use crate::session::Controls;
use std::fmt::Write as _;

/// Descriptions longer than this are replaced by the short description
const MAX_DESCRIPTION_CHARS: usize = 2048;
const POSTER_FALLBACK_BASE: &str = "https://kinopoiskapiunofficial.tech/images/posters/kp";

const UNKNOWN: &str = "Неизвестно";

const BACK: &str = "⬅️ Назад";
const FORWARD: &str = "Вперёд ➡️";
const LINKS: &str = "🎬 Где посмотреть";

/// Escape text for MarkdownV2
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn bold(text: &str) -> String {
    format!("*{}*", escape(text))
}

fn italic(text: &str) -> String {
    format!("_{}_", escape(text))
}

/// Inline link; inside the URL part only `)` and `\` need escaping
fn link(label: &str, url: &str) -> String {
    let url = url.replace('\\', "\\\\").replace(')', "\\)");
    format!("[{}]({url})", escape(label))
}

fn field(label: &str, value: &str) -> String {
    format!("{} {}", bold(label), escape(value))
}

fn unknown_field(label: &str) -> String {
    format!("{} {}", bold(label), italic(UNKNOWN))
}

/// Poster to show, falling back to the provider's canonical poster path
pub fn poster_url(details: &MovieDetails) -> String {
    details
        .poster_url
        .clone()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| format!("{POSTER_FALLBACK_BASE}/{}.jpg", details.id))
}

/// Caption of a candidate card
pub fn movie_caption(details: &MovieDetails) -> String {
    let mut lines = vec![bold(details.display_name())];

    if let Some(description) = description(details) {
        lines.push(escape(description));
    }
    lines.push(String::new());

    lines.push(release_years(details));
    lines.push(rating(details));
    lines.push(list_field(&details.countries, "Страна производства:", "Страны производства:"));
    lines.push(list_field(&details.genres, "Жанр фильма:", "Жанры фильма:"));
    lines.push(length(details));

    lines.join("\n")
}

fn description(details: &MovieDetails) -> Option<&str> {
    let full = details.description.as_deref()?;
    if full.chars().count() > MAX_DESCRIPTION_CHARS {
        if let Some(short) = details.short_description.as_deref() {
            return Some(short);
        }
    }
    Some(full)
}

fn release_years(details: &MovieDetails) -> String {
    if !details.serial {
        let label = "Год выхода фильма:";
        return details
            .year
            .map_or_else(|| unknown_field(label), |year| field(label, &year.to_string()));
    }

    let label = "Года выхода сериала:";
    let years = match (details.start_year, details.end_year) {
        (None, None) => return unknown_field(label),
        (Some(start), Some(end)) if start == end => escape(&start.to_string()),
        (start, end) => format!(
            "{} \\- {}",
            start.map_or_else(|| italic("неизвестно"), |y| escape(&y.to_string())),
            end.map_or_else(|| italic("наст. время"), |y| escape(&y.to_string())),
        ),
    };
    format!("{} {years}", bold(label))
}

fn rating(details: &MovieDetails) -> String {
    match (details.rating_kinopoisk, details.rating_imdb) {
        (Some(rating), _) => field("Рейтинг на Кинопоиске:", &rating.to_string()),
        (None, Some(rating)) => field("Рейтинг на IMDb:", &rating.to_string()),
        (None, None) => bold("Рейтинг не найден"),
    }
}

fn list_field(values: &[String], singular: &str, plural: &str) -> String {
    match values {
        [] => unknown_field(singular),
        [single] => field(singular, single),
        many => field(plural, &many.join(", ")),
    }
}

fn length(details: &MovieDetails) -> String {
    let Some(minutes) = details.film_length else {
        return unknown_field("Длительность:");
    };
    let label = if details.serial {
        "Длительность серии:"
    } else {
        "Длительность фильма:"
    };
    field(label, &format!("{minutes} мин."))
}

/// Inline keyboard for the controls that apply at the current position
pub fn keyboard(controls: Controls) -> InlineKeyboardMarkup {
    let button = |text: &str, action: CallbackAction| InlineKeyboardButton {
        text: text.to_string(),
        callback_data: action.data().to_string(),
    };

    let mut navigation = Vec::new();
    if controls.previous {
        navigation.push(button(BACK, CallbackAction::Previous));
    }
    if controls.next {
        navigation.push(button(FORWARD, CallbackAction::Next));
    }

    let mut rows = Vec::new();
    if !navigation.is_empty() {
        rows.push(navigation);
    }
    if controls.watch {
        rows.push(vec![button(LINKS, CallbackAction::Watch)]);
    }
    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}

pub fn watch_links(details: &MovieDetails, links: &WatchLinks) -> String {
    let mut text = format!(
        "{}{}{}",
        escape("По этим ссылкам ты можешь посмотреть \""),
        bold(details.display_name()),
        escape("\".\nОбрати внимание, некоторые из них ведут на платные ресурсы."),
    );

    if links.is_empty() {
        text.push_str("\n\n");
        text.push_str(&italic("К сожалению, ссылок не нашлось."));
        return text;
    }

    text.push('\n');
    for watch_link in links.iter() {
        text.push('\n');
        text.push_str(&link(&watch_link.source, &watch_link.url));
    }
    text
}

pub fn stats(stats: &[ViewCount]) -> String {
    let mut text = bold("Статистика просмотров:");
    if stats.is_empty() {
        let _ = write!(text, "\n{}", italic("Пока ничего не показано."));
        return text;
    }
    for view in stats {
        let _ = write!(text, "\n{}", escape(&format!("{} : {}", view.title, view.count)));
    }
    text
}

pub fn history(history: &[HistoryRecord]) -> String {
    let mut text = bold("История запросов:");
    if history.is_empty() {
        let _ = write!(text, "\n{}", italic("Запросов пока не было."));
        return text;
    }
    for record in history {
        let line = format!(
            "{} : {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.request
        );
        let _ = write!(text, "\n{}", escape(&line));
    }
    text
}

pub fn notice(notice: &Notice) -> String {
    match notice {
        Notice::Greeting { first_name } => {
            let greeting = match first_name {
                Some(name) => format!("Привет, {name}!"),
                None => "Привет!".to_string(),
            };
            escape(&format!(
                "{greeting}\nЯ помогу найти фильм или сериал. Напиши название, \
                 а я покажу, что нашлось на Кинопоиске, и подскажу, где его посмотреть."
            ))
        }
        Notice::Help => escape(
            "Напиши название фильма или сериала, и я найду его на Кинопоиске. \
             Кнопками под карточкой можно листать результаты и получить ссылки для просмотра.\n\n\
             /statistics - сколько раз я показывал тебе каждый фильм\n\
             /history - твои прошлые запросы\n\
             /restart - начать заново",
        ),
        Notice::Restarted => escape("Начнём сначала! Напиши название фильма."),
        Notice::NotFound => escape("К сожалению, я не нашёл ни одного фильма по этому запросу."),
        Notice::StaleInteraction => escape("Я не могу отвечать на сообщения из прошлого"),
        Notice::NoPreviousCandidate => escape("Это первый фильм в списке"),
        Notice::NoNextCandidate => escape("Это последний фильм в списке"),
        Notice::ProviderFailed => {
            escape("Не получилось связаться с сервисом, попробуй ещё раз чуть позже.")
        }
        Notice::PersistenceFailed => escape("Не получилось сохранить данные, попробуй ещё раз."),
        Notice::Busy => escape("Я ещё разбираюсь с прошлыми запросами, подожди немного."),
        Notice::Unsupported => escape("Я не умею принимать такой формат данных"),
    }
}
