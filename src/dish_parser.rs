use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

use crate::error::PipelineError;

pub const MIN_DISH_CHARS: usize = 3;
pub const MAX_DISH_CHARS: usize = 100;

/// Meta-commentary fragments models like to wrap their lists in.
const DENYLIST: &[&str] = &[
    "here are",
    "here is",
    "the dishes",
    "menu items",
    "food items",
    "dish names",
    "from the menu",
    "on the menu",
    "plaintext",
    "markdown",
    "```",
    "sure,",
    "okay,",
];

/// Conversational openers that only count as whole words, so "Okra Stew" and
/// "Sherry Trifle" survive.
static CHATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:sure|okay|ok)\b|\bhere['’]?s\b").expect("static regex")
});

static LEADING_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s0-9.)\-*•·]+").expect("static regex"));

/// Turns the extraction model's completion into an ordered dish list.
///
/// JSON arrays of strings (bare, fenced, or under a `dishes` key) are taken
/// verbatim. Anything else is treated as one candidate per line.
///
/// # Errors
///
/// Returns `ResponseUnparseable` when the content is JSON of an unexpected
/// shape, or looks like a JSON array but does not parse.
pub fn parse_dishes(content: &str) -> Result<Vec<String>, PipelineError> {
    let trimmed = content.trim();

    if let Some(fenced) = extract_fenced_json(trimmed) {
        let value: JsonValue = serde_json::from_str(&fenced)
            .map_err(|e| PipelineError::ResponseUnparseable(format!("fenced JSON: {e}")))?;
        return dishes_from_json(&value);
    }

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str::<JsonValue>(trimmed) {
            Ok(value) => return dishes_from_json(&value),
            Err(e) if looks_like_json(trimmed) => {
                return Err(PipelineError::ResponseUnparseable(format!(
                    "{e}; preview: {}",
                    trimmed.chars().take(200).collect::<String>()
                )));
            }
            Err(_) => {}
        }
    }

    Ok(parse_lines(trimmed))
}

fn looks_like_json(s: &str) -> bool {
    (s.starts_with('[') && s.ends_with(']')) || (s.starts_with('{') && s.ends_with('}'))
}

fn dishes_from_json(value: &JsonValue) -> Result<Vec<String>, PipelineError> {
    let list = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(obj) => match obj.get("dishes") {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(PipelineError::ResponseUnparseable(
                    "JSON object without a `dishes` array".into(),
                ));
            }
        },
        other => {
            return Err(PipelineError::ResponseUnparseable(format!(
                "expected a JSON array, got {other}"
            )));
        }
    };

    list.iter()
        .map(|v| {
            v.as_str().map(ToString::to_string).ok_or_else(|| {
                PipelineError::ResponseUnparseable(format!("non-string dish entry: {v}"))
            })
        })
        .collect()
}

/// Extract a JSON array or object from a ```json ... ``` fenced block.
fn extract_fenced_json(s: &str) -> Option<String> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)```(?:json)?\s*(\[.*?\]|\{.*?\})\s*```").expect("static regex")
    });

    FENCE_RE
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_lines(content: &str) -> Vec<String> {
    content.lines().filter_map(clean_line).collect()
}

/// Normalizes one free-text line; `None` if it doesn't look like a dish.
fn clean_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with("```") || line.ends_with("```") {
        return None;
    }

    let dish = LEADING_MARKER_RE.replace(line, "");
    let dish = dish.trim_end_matches('*').trim();

    let len = dish.chars().count();
    if !(MIN_DISH_CHARS..=MAX_DISH_CHARS).contains(&len) {
        tracing::debug!(line = %raw, "skipping line by length");
        return None;
    }
    if dish.contains(':') || dish.ends_with(['.', '!', '?']) {
        tracing::debug!(line = %raw, "skipping line with punctuation");
        return None;
    }
    let lower = dish.to_lowercase();
    if DENYLIST.iter().any(|phrase| lower.contains(phrase)) || CHATTER_RE.is_match(dish) {
        tracing::debug!(line = %raw, "skipping meta commentary");
        return None;
    }

    Some(dish.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_is_taken_verbatim() {
        let got = parse_dishes(r#"["Beef Taco", "  Chicken Fajitas ", "Here are: x", "Beef Taco"]"#)
            .unwrap();
        assert_eq!(
            got,
            vec!["Beef Taco", "  Chicken Fajitas ", "Here are: x", "Beef Taco"]
        );
    }

    #[test]
    fn fenced_json_array() {
        let got = parse_dishes("```json\n[\"Pho\", \"Banh Mi\"]\n```").unwrap();
        assert_eq!(got, vec!["Pho", "Banh Mi"]);
    }

    #[test]
    fn dishes_key_in_object() {
        let got = parse_dishes(r#"{"dishes": ["Paella"]}"#).unwrap();
        assert_eq!(got, vec!["Paella"]);
    }

    #[test]
    fn empty_array_is_not_an_error() {
        assert!(parse_dishes("[]").unwrap().is_empty());
    }

    #[test]
    fn unexpected_json_shapes_are_unparseable() {
        for input in [r#"{"items": ["Pho"]}"#, "[1, 2]", r#"["Pho", "Ramen",]"#] {
            assert!(
                matches!(parse_dishes(input), Err(PipelineError::ResponseUnparseable(_))),
                "{input}"
            );
        }
    }

    #[test]
    fn free_text_strips_markers() {
        let text = "1. Carne Asada\n2) Pollo Asado\n- Elote\n• Churros\n* **Horchata**\n\n";
        assert_eq!(
            parse_dishes(text).unwrap(),
            vec!["Carne Asada", "Pollo Asado", "Elote", "Churros", "Horchata"]
        );
    }

    #[test]
    fn free_text_drops_meta_lines_regardless_of_case() {
        let text = "HERE ARE THE DISHES\nHere are the dishes:\n```plaintext\nTom Yum\nPad Thai\n```\nSure, happy to help\nThese are the MENU ITEMS";
        assert_eq!(parse_dishes(text).unwrap(), vec!["Tom Yum", "Pad Thai"]);

        let text = "Sure\nOkay\nOK then\nHere's what I can see\nhere’s the list\nPad Thai";
        assert_eq!(parse_dishes(text).unwrap(), vec!["Pad Thai"]);
    }

    #[test]
    fn chatter_words_inside_dish_names_are_kept() {
        let text = "Okra Stew\nSherry Trifle\nSurely Good Ribs\nThere's No Place Like Home Fries";
        assert_eq!(
            parse_dishes(text).unwrap(),
            vec![
                "Okra Stew",
                "Sherry Trifle",
                "Surely Good Ribs",
                "There's No Place Like Home Fries"
            ]
        );
    }

    #[test]
    fn free_text_length_and_punctuation_bounds() {
        let long = "x".repeat(MAX_DISH_CHARS + 1);
        let text = format!("Ok\n{long}\nSoup of the day: tomato\nEnjoy your meal.\nReally?\nGyoza");
        assert_eq!(parse_dishes(&text).unwrap(), vec!["Gyoza"]);
    }

    #[test]
    fn free_text_keeps_order_and_duplicates() {
        let text = "Ramen\nGyoza\nRamen";
        assert_eq!(parse_dishes(text).unwrap(), vec!["Ramen", "Gyoza", "Ramen"]);
    }

    #[test]
    fn only_noise_yields_empty() {
        assert!(parse_dishes("Here are the menu items:\n```").unwrap().is_empty());
        assert!(parse_dishes("").unwrap().is_empty());
    }

    #[test]
    fn bracketed_free_text_still_parses() {
        assert_eq!(parse_dishes("[Chef's pick] Lasagna\nTiramisu").unwrap(), vec![
            "[Chef's pick] Lasagna",
            "Tiramisu"
        ]);
    }
}
