use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use pulldown_cmark::{html, Event, Options, Parser};

use crate::config::Settings;

/// Facts about the run shown in the digest header/footer.
#[derive(Debug, Clone)]
pub struct DigestMetadata {
    pub newsletter_name: String,
    pub ai_provider: String,
    pub article_count: usize,
    pub feed_successes: usize,
    pub feed_total: usize,
    pub run_started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DigestRenderer;

impl DigestRenderer {
    /// Markdown body only. Raw HTML from the model is escaped, never passed through.
    pub fn markdown_to_html(markdown: &str) -> String {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        let parser = Parser::new_ext(markdown, opts).map(|ev| match ev {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }

    pub fn render(&self, markdown: &str, meta: &DigestMetadata) -> String {
        let body = Self::markdown_to_html(markdown);
        let name = html_escape::encode_text(&meta.newsletter_name);
        let provider = html_escape::encode_text(&meta.ai_provider);
        let started = meta.run_started_at.format("%Y-%m-%d %H:%M UTC");
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{name}</title>
<style>
body {{ font-family: -apple-system, Segoe UI, Helvetica, Arial, sans-serif; color: #1f2933; max-width: 760px; margin: 0 auto; padding: 24px; }}
h1 {{ font-size: 22px; border-bottom: 2px solid #e4e7eb; padding-bottom: 8px; }}
table {{ border-collapse: collapse; margin: 12px 0; }}
th, td {{ border: 1px solid #cbd2d9; padding: 4px 8px; }}
.meta {{ color: #7b8794; font-size: 12px; margin-top: 32px; }}
</style>
</head>
<body>
<h1>{name}</h1>
{body}
<p class="meta">Generated by {provider} from {articles} articles ({ok}/{total} feeds) &middot; run started {started}</p>
</body>
</html>
"#,
            articles = meta.article_count,
            ok = meta.feed_successes,
            total = meta.feed_total,
        )
    }
}

/// A rendered digest ready to hand to a mailer.
#[derive(Debug, Clone)]
pub struct OutgoingDigest {
    pub subject: String,
    pub html: String,
    /// Plain-text alternative (the model's markdown).
    pub text: String,
    /// Empty means "mailer defaults".
    pub recipients: Vec<String>,
}

#[async_trait]
pub trait DigestMailer: Send + Sync {
    async fn send(&self, digest: &OutgoingDigest) -> Result<()>;
}

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    default_recipients: Vec<String>,
}

impl SmtpMailer {
    pub fn from_settings(s: &Settings) -> Result<Self> {
        let host = s.smtp_host.as_deref().context("SMTP_HOST missing")?;
        let from_addr = s.from_email.as_deref().context("DIGEST_FROM_EMAIL missing")?;

        // 465 is implicit TLS; everything else negotiates STARTTLS.
        let builder = if s.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .context("invalid SMTP_HOST")?
        .port(s.smtp_port);

        let builder = match (&s.smtp_user, &s.smtp_pass) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        let from: Mailbox = format!("{} <{}>", s.from_name, from_addr)
            .parse()
            .context("invalid DIGEST_FROM_EMAIL")?;

        Ok(Self {
            mailer: builder.build(),
            from,
            default_recipients: s.default_recipients.clone(),
        })
    }

    pub fn resolve_recipients<'a>(&'a self, digest: &'a OutgoingDigest) -> &'a [String] {
        if digest.recipients.is_empty() {
            &self.default_recipients
        } else {
            &digest.recipients
        }
    }
}

#[async_trait]
impl DigestMailer for SmtpMailer {
    async fn send(&self, digest: &OutgoingDigest) -> Result<()> {
        let recipients = self.resolve_recipients(digest);
        if recipients.is_empty() {
            bail!("no recipients configured");
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(digest.subject.clone());
        for r in recipients {
            let mbox: Mailbox = r
                .parse()
                .with_context(|| format!("invalid recipient address {r}"))?;
            builder = builder.to(mbox);
        }
        let msg = builder
            .multipart(MultiPart::alternative_plain_html(
                digest.text.clone(),
                digest.html.clone(),
            ))
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        tracing::info!(
            target: "notify",
            subject = %digest.subject,
            recipients = recipients.len(),
            "digest email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> DigestMetadata {
        DigestMetadata {
            newsletter_name: "Morning <Markets>".into(),
            ai_provider: "OpenAI gpt-5-mini".into(),
            article_count: 12,
            feed_successes: 2,
            feed_total: 3,
            run_started_at: Utc.with_ymd_and_hms(2025, 6, 10, 6, 30, 0).unwrap(),
        }
    }

    #[test]
    fn tables_and_strikethrough_render() {
        let html = DigestRenderer::markdown_to_html("| a | b |\n| - | - |\n| 1 | 2 |\n\n~~gone~~");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = DigestRenderer::markdown_to_html("hi <script>alert(1)</script>\n\n<div>block</div>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<div>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn template_carries_metadata() {
        let out = DigestRenderer.render("## Hello", &meta());
        assert!(out.contains("<h2>Hello</h2>"));
        assert!(out.contains("Morning &lt;Markets&gt;"));
        assert!(out.contains("12 articles (2/3 feeds)"));
        assert!(out.contains("2025-06-10 06:30 UTC"));
    }

    #[test]
    fn mailer_requires_host_and_sender() {
        let s = Settings::default();
        assert!(SmtpMailer::from_settings(&s).is_err());
    }
}
