//! Run one configured newsletter immediately and print the outcome.
//!
//! Usage: `run_once <newsletter name> [--preview out.html]`
//! With `--preview`, the rendered HTML is also written to the given file.

use anyhow::{bail, Context, Result};

use market_digest::config::{newsletters::load_newsletters_default, Settings};
use market_digest::pipeline::NewsletterPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    market_digest::init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        bail!("usage: run_once <newsletter name> [--preview out.html]");
    };
    let preview = match (args.next().as_deref(), args.next()) {
        (Some("--preview"), Some(path)) => Some(path),
        (None, _) => None,
        _ => bail!("usage: run_once <newsletter name> [--preview out.html]"),
    };

    let settings = Settings::from_env().context("loading settings")?;
    let newsletters = load_newsletters_default(settings.newsletters_path.as_deref())?;
    let Some(config) = newsletters.iter().find(|n| n.name == name) else {
        let known: Vec<&str> = newsletters.iter().map(|n| n.name.as_str()).collect();
        bail!("unknown newsletter '{name}' (configured: {known:?})");
    };

    let pipeline = NewsletterPipeline::from_settings(&settings)?;
    let result = pipeline.run(config).await;

    for status in &result.feed_statuses {
        println!("{status}");
    }
    println!(
        "success={} provider={} articles={} error={}",
        result.success,
        result.ai_provider,
        result.article_count,
        result.error.as_deref().unwrap_or("-")
    );

    if let (Some(path), Some(html)) = (preview, result.html_content.as_deref()) {
        std::fs::write(&path, html).with_context(|| format!("writing preview to {path}"))?;
        println!("preview written to {path}");
    }
    Ok(())
}
