//! jenrich I/O - Path resolution, upsert and high-level enrichment APIs
//!
//! This crate ties the event parser to the two document passes:
//!
//! - Materialized and streaming path resolution
//! - Search value extraction, including `concat()`
//! - The positional upsert transform
//! - Request/summary entry points that read an input, run the pipeline and
//!   commit the output only when every stage succeeded

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod queue;
pub mod resolve;
pub mod search;
pub mod upsert;

// Re-export commonly used types
pub use jenrich_codec::{EventParser, WriterOptions};
pub use jenrich_format::{
    EnrichError, Limits, MatchedNode, PathExpression, Result, SearchExpression,
};

// Re-export our own types
pub use queue::ReplacementQueue;
pub use resolve::{resolve, resolve_events, resolve_required};
pub use search::{evaluate_search, extract_search_values};
pub use upsert::{upsert_events, UpsertMetrics, UpsertOptions, UpsertTransform};

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Where a document is read from
///
/// The upsert pass re-reads the input, so sources must be re-openable.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// File on disk
    Path(PathBuf),
    /// Document held in memory
    Bytes(Vec<u8>),
}

impl InputSource {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        match self {
            InputSource::Path(path) => Ok(Box::new(File::open(path)?)),
            InputSource::Bytes(bytes) => Ok(Box::new(bytes.as_slice())),
        }
    }

    fn events(&self) -> Result<EventParser<Box<dyn Read + '_>>> {
        Ok(EventParser::new(self.open()?))
    }
}

/// Where the transformed document is written
pub enum OutputSink {
    /// File on disk, replaced atomically on success only
    Path(PathBuf),
    /// Arbitrary writer
    Writer(Box<dyn Write + Send>),
}

impl OutputSink {
    fn commit(self, bytes: &[u8]) -> Result<()> {
        match self {
            OutputSink::Path(path) => replace_file(&path, bytes)?,
            OutputSink::Writer(mut writer) => {
                writer.write_all(bytes)?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}

/// Stage `bytes` in a sibling temporary file and rename it over `path`
///
/// An existing target keeps its permissions; a failed write leaves it
/// untouched.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    match std::fs::metadata(path) {
        Ok(existing) => staged.as_file().set_permissions(existing.permissions())?,
        Err(_) => default_permissions(staged.as_file())?,
    }
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = bytes.len(), "output committed");
    Ok(())
}

#[cfg(unix)]
fn default_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

/// Search-phase request
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Document to read
    pub input: InputSource,
    /// Expression producing the search values
    pub search: SearchExpression,
}

/// Search-phase result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Search values in document order
    pub values: Vec<String>,
}

/// Extract search values in one streaming pass
pub fn execute_extract(request: ExtractRequest) -> Result<ExtractSummary> {
    let values = extract_search_values(request.input.events()?, &request.search)?;
    Ok(ExtractSummary { values })
}

/// Upsert-phase request
pub struct UpsertRequest {
    /// Original document
    pub input: InputSource,
    /// Destination of the transformed document
    pub output: OutputSink,
    /// Path receiving the replacement values
    pub target: PathExpression,
    /// Replacement values in match order
    pub replacements: Vec<Value>,
    /// Upsert behaviour
    pub options: UpsertOptions,
    /// Output formatting
    pub writer: WriterOptions,
}

/// Upsert-phase result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Counters from the upsert pass
    pub metrics: UpsertMetrics,
    /// Size of the committed document
    pub bytes_written: usize,
}

/// Re-stream the input with replacement values applied at the target
///
/// Nothing reaches the sink unless the whole pass succeeds.
pub fn execute_upsert(request: UpsertRequest) -> Result<UpsertSummary> {
    let (rendered, metrics) = render_upsert(
        &request.input,
        &request.target,
        request.replacements,
        request.options,
        request.writer,
    )?;
    let bytes_written = rendered.len();
    request.output.commit(&rendered)?;
    Ok(UpsertSummary {
        metrics,
        bytes_written,
    })
}

/// Provides one replacement value per search value
pub trait ReplacementSource {
    /// Map search values to replacement values, preserving order
    fn replacements(&mut self, search_values: &[String]) -> Result<Vec<Value>>;
}

impl<F> ReplacementSource for F
where
    F: FnMut(&[String]) -> Result<Vec<Value>>,
{
    fn replacements(&mut self, search_values: &[String]) -> Result<Vec<Value>> {
        self(search_values)
    }
}

/// Replacement source backed by a JSON object keyed by search value
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: Map<String, Value>,
    fallback: Option<Value>,
}

impl LookupTable {
    /// Table over the members of a JSON object
    pub fn new(entries: Map<String, Value>) -> Self {
        Self {
            entries,
            fallback: None,
        }
    }

    /// Load a table from a JSON object document
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        match serde_json::from_reader(reader)? {
            Value::Object(entries) => Ok(Self::new(entries)),
            other => Err(EnrichError::Replacement(format!(
                "lookup table must be a JSON object, found {}",
                jenrich_format::type_name(&other)
            ))),
        }
    }

    /// Use `value` for search values missing from the table
    pub fn with_fallback(mut self, value: Value) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReplacementSource for LookupTable {
    fn replacements(&mut self, search_values: &[String]) -> Result<Vec<Value>> {
        search_values
            .iter()
            .map(|search| {
                self.entries
                    .get(search)
                    .or(self.fallback.as_ref())
                    .cloned()
                    .ok_or_else(|| {
                        EnrichError::Replacement(format!(
                            "no replacement for search value '{}'",
                            search
                        ))
                    })
            })
            .collect()
    }
}

/// Full enrichment request: search, replace, upsert
pub struct EnrichRequest {
    /// Original document, read once per pass
    pub input: InputSource,
    /// Destination of the enriched document
    pub output: OutputSink,
    /// Expression producing the search values
    pub search: SearchExpression,
    /// Path receiving the replacement values
    pub target: PathExpression,
    /// Upsert behaviour
    pub options: UpsertOptions,
    /// Output formatting
    pub writer: WriterOptions,
}

/// Full enrichment result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichSummary {
    /// Search values in document order
    pub search_values: Vec<String>,
    /// Counters from the upsert pass
    pub metrics: UpsertMetrics,
    /// Size of the committed document
    pub bytes_written: usize,
}

/// Run the search pass, fetch replacements and run the upsert pass
///
/// The replacement source must return exactly one value per search value.
/// The output sink is written only after both passes succeeded.
pub fn execute_enrich(
    request: EnrichRequest,
    source: &mut dyn ReplacementSource,
) -> Result<EnrichSummary> {
    let search_values = extract_search_values(request.input.events()?, &request.search)?;
    let replacements = source.replacements(&search_values)?;
    if replacements.len() != search_values.len() {
        return Err(EnrichError::correlation(format!(
            "replacement source returned {} value(s) for {} search value(s)",
            replacements.len(),
            search_values.len()
        )));
    }
    debug!(
        count = replacements.len(),
        "replacement values received"
    );

    let (rendered, metrics) = render_upsert(
        &request.input,
        &request.target,
        replacements,
        request.options,
        request.writer,
    )?;
    let bytes_written = rendered.len();
    request.output.commit(&rendered)?;
    Ok(EnrichSummary {
        search_values,
        metrics,
        bytes_written,
    })
}

fn render_upsert(
    input: &InputSource,
    target: &PathExpression,
    replacements: Vec<Value>,
    options: UpsertOptions,
    writer: WriterOptions,
) -> Result<(Vec<u8>, UpsertMetrics)> {
    let mut transform =
        UpsertTransform::new(input.events()?, target.clone(), replacements).with_options(options);
    let rendered = jenrich_codec::write_events(transform.by_ref(), Vec::new(), writer)?;
    Ok((rendered, transform.metrics()))
}
