//! Guarantee an `/index.html` the dev server can serve.

use super::templates::{TemplateKind, DEFAULT_ENTRY_POINT, ENTRY_CANDIDATES};
use super::{entry, ScaffoldContext};

pub const INDEX_HTML_PATH: &str = "/index.html";

/// Where the generated page came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    Existing,
    Template { kind: TemplateKind, entry_point: String },
    Copied { from: String },
    Fallback,
}

/// Make sure `/index.html` exists. Never fails; a failed write is logged.
pub async fn ensure_index_html(ctx: &ScaffoldContext<'_>) -> IndexSource {
    if ctx.fs.is_file(INDEX_HTML_PATH).await {
        tracing::debug!("index.html already present");
        return IndexSource::Existing;
    }

    let (source, html) = match plan(ctx).await {
        Ok(planned) => planned,
        Err(e) => {
            tracing::warn!("Error ensuring index.html: {e:#}");
            (IndexSource::Fallback, TemplateKind::Fallback.render(DEFAULT_ENTRY_POINT))
        }
    };

    if let Err(e) = ctx.fs.write_file(INDEX_HTML_PATH, &html).await {
        tracing::warn!("Error writing index.html: {e:#}");
        return source;
    }
    tracing::info!(?source, "Created index.html");
    source
}

async fn plan(ctx: &ScaffoldContext<'_>) -> anyhow::Result<(IndexSource, String)> {
    for candidate in ENTRY_CANDIDATES {
        if ctx.fs.is_file(candidate.path).await {
            let source = IndexSource::Template {
                kind: candidate.kind,
                entry_point: candidate.path.to_string(),
            };
            return Ok((source, candidate.kind.render(candidate.path)));
        }
    }

    if let Some(found) = entry::find(ctx.fs, ctx.walk).await {
        let html = ctx.fs.read_file(&found).await?;
        return Ok((IndexSource::Copied { from: found }, html));
    }

    Ok((IndexSource::Fallback, TemplateKind::Fallback.render(DEFAULT_ENTRY_POINT)))
}
