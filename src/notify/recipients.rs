// src/notify/recipients.rs
//! Recipient list normalization shared by settings, newsletter config and the pipeline.

/// Trim, drop empties, de-duplicate keeping first occurrence.
pub fn clean_recipients<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for it in items {
        let t = it.as_ref().trim();
        if !t.is_empty() && !out.iter().any(|e| e == t) {
            out.push(t.to_string());
        }
    }
    out
}

/// Accepts a JSON array string (`["a@x", "b@x"]`) or comma/newline separated text.
///
/// Returns `fallback` when `value` is `None` or yields nothing usable.
pub fn coerce_recipient_list(value: Option<&str>, fallback: Option<&[String]>) -> Option<Vec<String>> {
    let use_fallback = || fallback.map(|f| f.to_vec());
    let Some(raw) = value else {
        return use_fallback();
    };

    let stripped = raw.trim();
    let parsed = if stripped.starts_with('[') && stripped.ends_with(']') {
        serde_json::from_str::<Vec<serde_json::Value>>(stripped)
            .ok()
            .map(|items| {
                items
                    .into_iter()
                    .flat_map(|v| match v {
                        serde_json::Value::String(s) => split_text(&s),
                        serde_json::Value::Null => Vec::new(),
                        other => vec![other.to_string()],
                    })
                    .collect::<Vec<_>>()
            })
    } else {
        None
    };
    let items = parsed.unwrap_or_else(|| split_text(stripped));

    let cleaned = clean_recipients(items);
    if cleaned.is_empty() {
        use_fallback()
    } else {
        Some(cleaned)
    }
}

fn split_text(s: &str) -> Vec<String> {
    s.split([',', '\n']).map(|p| p.trim().to_string()).collect()
}
