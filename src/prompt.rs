// src/prompt.rs
//! Prompt assembly. Fragments are compiled in from `prompts/`.

const BASE_PROMPT: &str = include_str!("../prompts/base_prompt.md");
const FORMAT_INSTRUCTIONS: &str = include_str!("../prompts/format_instructions.md");
const MARKET_PROMPT: &str = include_str!("../prompts/market_prompt.md");
const SYSTEM_MESSAGE: &str = include_str!("../prompts/system_message.md");

const NEWSLETTER_TYPES: &[(&str, &str)] = &[
    (
        "general_business",
        include_str!("../prompts/newsletter_types/general_business.md"),
    ),
    (
        "market_close",
        include_str!("../prompts/newsletter_types/market_close.md"),
    ),
    (
        "tech_sector",
        include_str!("../prompts/newsletter_types/tech_sector.md"),
    ),
];

pub const NO_MARKET_DATA_NOTICE: &str = "No direct market performance data was supplied for this briefing. \
Do not fabricate price tables or refer to watchlist tickers unless they are explicitly provided.";

#[derive(Debug, Clone, Default)]
pub struct PromptInputs<'a> {
    pub articles_text: &'a str,
    pub market_text: Option<&'a str>,
    pub watchlist: &'a [String],
    pub newsletter_type: Option<&'a str>,
    pub custom_prompt: Option<&'a str>,
}

pub fn system_prompt() -> &'static str {
    SYSTEM_MESSAGE.trim()
}

pub fn newsletter_types() -> impl Iterator<Item = &'static str> {
    NEWSLETTER_TYPES.iter().map(|(name, _)| *name)
}

fn newsletter_instructions(kind: &str) -> Option<&'static str> {
    NEWSLETTER_TYPES
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, text)| text.trim())
}

pub fn build_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut watchlist: Vec<String> = inputs
        .watchlist
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    let include_market = !watchlist.is_empty();

    let mut sections: Vec<String> = vec![BASE_PROMPT.trim().to_string()];

    if let Some(kind) = inputs.newsletter_type.filter(|k| !k.is_empty()) {
        match newsletter_instructions(kind) {
            Some(text) => sections.push(text.to_string()),
            None => tracing::debug!(newsletter_type = kind, "no instructions for newsletter type"),
        }
    }

    if include_market {
        sections.push(MARKET_PROMPT.trim().to_string());
    }

    match inputs.market_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(market) => sections.push(format!("\n\n## Market Data\n{market}")),
        None if include_market => sections.push(format!("\n\n{NO_MARKET_DATA_NOTICE}")),
        None => {}
    }

    if !inputs.articles_text.is_empty() {
        sections.push(format!("\n\n## Articles\n{}", inputs.articles_text.trim()));
    }

    if include_market {
        watchlist.sort();
        watchlist.dedup();
        sections.push(format!(
            "\n\nFocus especially on these watchlist tickers: {}.",
            watchlist.join(", ")
        ));
    }

    if let Some(custom) = inputs.custom_prompt.filter(|c| !c.is_empty()) {
        sections.push(format!("\n\n{}", custom.trim()));
    }

    let format = FORMAT_INSTRUCTIONS.trim();
    if !format.is_empty() {
        sections.push(format!("\n\n{format}"));
    }

    sections.retain(|s| !s.is_empty());
    sections.join("\n")
}
