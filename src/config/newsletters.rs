// src/config/newsletters.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedDefinition;
use crate::notify::recipients::clean_recipients;

const ENV_PATH: &str = "NEWSLETTERS_PATH";

pub const DEFAULT_NEWSLETTER_TYPE: &str = "general_business";

/// One configured newsletter: which feeds to read, how to prompt, who gets it and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsletterConfig {
    pub name: String,
    #[serde(default)]
    pub feeds: Vec<FeedDefinition>,
    #[serde(default)]
    pub custom_prompt: String,
    #[serde(default = "default_newsletter_type")]
    pub newsletter_type: String,
    #[serde(default = "default_verbosity")]
    pub verbosity: String,
    #[serde(default)]
    pub watchlist: Vec<String>,
    /// Empty means "use the default recipients".
    #[serde(default)]
    pub recipients: Vec<String>,
    /// `HH:MM` local time; empty means the default send times.
    #[serde(default)]
    pub schedule_times: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_newsletter_type() -> String {
    DEFAULT_NEWSLETTER_TYPE.to_string()
}

fn default_verbosity() -> String {
    "medium".to_string()
}

fn default_active() -> bool {
    true
}

impl NewsletterConfig {
    pub fn new(name: &str, feeds: Vec<FeedDefinition>) -> Self {
        Self {
            name: name.to_string(),
            feeds,
            custom_prompt: String::new(),
            newsletter_type: default_newsletter_type(),
            verbosity: default_verbosity(),
            watchlist: Vec::new(),
            recipients: Vec::new(),
            schedule_times: Vec::new(),
            active: true,
        }
    }

    /// Upper-cased, non-empty tickers in configured order.
    pub fn normalized_watchlist(&self) -> Vec<String> {
        self.watchlist
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
struct NewsletterFile {
    #[serde(default)]
    newsletters: Vec<NewsletterConfig>,
}

/// Load newsletters from an explicit path. Supports TOML or JSON formats.
pub fn load_newsletters_from(path: &Path) -> Result<Vec<NewsletterConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading newsletters from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_newsletters(&content, ext.as_str())
}

/// Load newsletters using env var + fallbacks:
/// 1) $NEWSLETTERS_PATH (or the explicit override)
/// 2) config/newsletters.toml
/// 3) config/newsletters.json
pub fn load_newsletters_default(explicit: Option<&Path>) -> Result<Vec<NewsletterConfig>> {
    let from_env = std::env::var(ENV_PATH).ok().map(PathBuf::from);
    if let Some(pb) = explicit.map(Path::to_path_buf).or(from_env) {
        if pb.exists() {
            return load_newsletters_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path {}", pb.display()));
        }
    }
    let toml_p = PathBuf::from("config/newsletters.toml");
    if toml_p.exists() {
        return load_newsletters_from(&toml_p);
    }
    let json_p = PathBuf::from("config/newsletters.json");
    if json_p.exists() {
        return load_newsletters_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_newsletters(s: &str, hint_ext: &str) -> Result<Vec<NewsletterConfig>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("[[newsletters");
    if try_toml {
        if let Ok(v) = toml::from_str::<NewsletterFile>(s) {
            return clean(v.newsletters);
        }
    }
    // JSON: either {"newsletters": [...]} or a bare array
    if let Ok(v) = serde_json::from_str::<NewsletterFile>(s) {
        return clean(v.newsletters);
    }
    if let Ok(v) = serde_json::from_str::<Vec<NewsletterConfig>>(s) {
        return clean(v);
    }
    // Fallback: also try TOML if not attempted
    if !try_toml {
        if let Ok(v) = toml::from_str::<NewsletterFile>(s) {
            return clean(v.newsletters);
        }
    }
    Err(anyhow!("unsupported newsletters format"))
}

fn clean(items: Vec<NewsletterConfig>) -> Result<Vec<NewsletterConfig>> {
    let mut out: Vec<NewsletterConfig> = Vec::with_capacity(items.len());
    for mut n in items {
        n.name = n.name.trim().to_string();
        if n.name.is_empty() {
            bail!("newsletter without a name");
        }
        if out.iter().any(|o| o.name == n.name) {
            bail!("duplicate newsletter name '{}'", n.name);
        }
        n.feeds.retain(|f| !f.url.trim().is_empty());
        n.recipients = clean_recipients(&n.recipients);
        n.custom_prompt = n.custom_prompt.trim().to_string();
        out.push(n);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const TOML: &str = r#"
[[newsletters]]
name = " Morning Markets "
watchlist = ["aapl", " msft "]
recipients = ["a@x.com", "a@x.com", " "]
schedule_times = ["07:00"]

[[newsletters.feeds]]
name = "Wire"
url = "https://wire.example/rss"

[[newsletters.feeds]]
name = "Blank"
url = ""
"#;

    #[test]
    fn toml_is_parsed_and_cleaned() {
        let out = parse_newsletters(TOML, "toml").unwrap();
        assert_eq!(out.len(), 1);
        let n = &out[0];
        assert_eq!(n.name, "Morning Markets");
        assert_eq!(n.feeds.len(), 1);
        assert_eq!(n.recipients, vec!["a@x.com".to_string()]);
        assert_eq!(n.normalized_watchlist(), vec!["AAPL", "MSFT"]);
        assert_eq!(n.newsletter_type, DEFAULT_NEWSLETTER_TYPE);
        assert!(n.active);
    }

    #[test]
    fn json_object_and_bare_array() {
        let obj = r#"{"newsletters":[{"name":"A","active":false}]}"#;
        let arr = r#"[{"name":"A"},{"name":"B","verbosity":"low"}]"#;
        assert!(!parse_newsletters(obj, "json").unwrap()[0].active);
        let v = parse_newsletters(arr, "json").unwrap();
        assert_eq!(v[1].verbosity, "low");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let arr = r#"[{"name":"A"},{"name":" A "}]"#;
        assert!(parse_newsletters(arr, "json").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD so the repo's own config/ doesn't interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);

        // No files → empty
        let v = load_newsletters_default(None).unwrap();
        assert!(v.is_empty());

        // Fallback file
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join("config/newsletters.toml"), TOML).unwrap();
        let v = load_newsletters_default(None).unwrap();
        assert_eq!(v[0].name, "Morning Markets");

        // Env wins
        let p_json = tmp.path().join("letters.json");
        fs::write(&p_json, r#"[{"name":"X"}]"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let v2 = load_newsletters_default(None).unwrap();
        assert_eq!(v2[0].name, "X");

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(load_newsletters_default(None).is_err());
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
