//! CSV export loading
//!
//! Exports come from ad-platform and Shopify UIs, so the reader is lenient:
//! ragged rows are accepted, a UTF-8 BOM is stripped, header cells are trimmed,
//! invalid UTF-8 is replaced rather than rejected, and blank lines are skipped.

use crate::error::{EngineError, EngineResult};
use crate::pipeline::pipeline_engine::PipelineInput;
use crate::pipeline::types::{Platform, RawTable};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Paths of the three exports; `None` skips a platform
#[derive(Debug, Clone, Default)]
pub struct InputPaths {
    pub meta: Option<PathBuf>,
    pub google: Option<PathBuf>,
    pub shopify: Option<PathBuf>,
}

/// Parse CSV bytes into a raw table
pub fn parse_table(platform: Platform, bytes: &[u8]) -> EngineResult<RawTable> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    let mut table = RawTable::new(platform, headers);

    for record in reader.byte_records() {
        let record = record?;
        if record.iter().all(|cell| cell.iter().all(u8::is_ascii_whitespace)) {
            continue;
        }
        table.push_row(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }

    debug!(%platform, columns = table.headers.len(), rows = table.len(), "Parsed CSV");
    Ok(table)
}

/// Load one export from disk
pub async fn load_table(platform: Platform, path: &Path) -> EngineResult<RawTable> {
    let bytes = tokio::fs::read(path).await?;
    let table = parse_table(platform, &bytes)?;
    info!(%platform, path = %path.display(), rows = table.len(), "Loaded export");
    Ok(table)
}

async fn load_optional(
    platform: Platform,
    path: Option<&Path>,
    cancel: &CancellationToken,
) -> EngineResult<Option<RawTable>> {
    let Some(path) = path else {
        return Ok(None);
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled(format!(
            "loading {} export {}",
            platform,
            path.display()
        ))),
        table = load_table(platform, path) => table.map(Some),
    }
}

/// Load every supplied export, stopping early if `cancel` fires
pub async fn load_input(paths: &InputPaths, cancel: &CancellationToken) -> EngineResult<PipelineInput> {
    Ok(PipelineInput {
        meta: load_optional(Platform::Meta, paths.meta.as_deref(), cancel).await?,
        google: load_optional(Platform::Google, paths.google.as_deref(), cancel).await?,
        shopify: load_optional(Platform::Shopify, paths.shopify.as_deref(), cancel).await?,
    })
}
