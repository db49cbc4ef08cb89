//! Selection and projection of a staged raw CSV into a candidate file.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::{info, warn};

use crate::error::{FilterError, SchemaError};
use crate::rules::DatasetRules;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub total_rows_seen: u64,
    pub rows_kept: u64,
    /// Rows whose field count did not match the header.
    pub rows_skipped: u64,
}

/// Filter `raw_path` into a new file at `output_path`.
///
/// The raw file is never modified. If anything fails the partially written
/// output is removed before returning.
pub fn filter_file(
    raw_path: &Path,
    output_path: &Path,
    rules: &DatasetRules,
) -> Result<FilterStats, FilterError> {
    info!(input = %raw_path.display(), "starting CSV filtering");

    let result = filter_into(raw_path, output_path, rules);
    match &result {
        Ok(stats) => info!(
            output = %output_path.display(),
            total_rows = stats.total_rows_seen,
            rows_kept = stats.rows_kept,
            rows_skipped = stats.rows_skipped,
            removed_columns = %removed_columns(rules),
            "CSV filtering completed"
        ),
        Err(_) => {
            if let Err(err) = fs::remove_file(output_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %output_path.display(), error = %err, "failed to remove partial output");
                }
            }
        }
    }
    result
}

fn filter_into(
    raw_path: &Path,
    output_path: &Path,
    rules: &DatasetRules,
) -> Result<FilterStats, FilterError> {
    let input = File::open(raw_path).map_err(|source| FilterError::Io {
        path: raw_path.to_path_buf(),
        source,
    })?;
    let csv_in = |source| FilterError::Csv {
        path: raw_path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let header = reader.headers().map_err(csv_in)?.clone();
    if header.is_empty() || header.iter().all(|name| name.trim().is_empty()) {
        return Err(SchemaError::EmptyHeader.into());
    }

    let selection = rules.selection.compile(&header)?;
    let projection = rules.excluded_fields.compile(&header);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| FilterError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let output = File::create(output_path).map_err(|source| FilterError::Io {
        path: output_path.to_path_buf(),
        source,
    })?;
    let csv_out = |source| FilterError::Csv {
        path: output_path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(BufWriter::new(output));
    writer.write_record(projection.header()).map_err(csv_out)?;

    let mut stats = FilterStats::default();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record).map_err(csv_in)? {
        stats.total_rows_seen += 1;

        if record.len() != header.len() {
            stats.rows_skipped += 1;
            warn!(
                line = record.position().map(|p| p.line()),
                expected = header.len(),
                found = record.len(),
                "skipping row with unexpected field count"
            );
            continue;
        }

        if selection.matches(&record) {
            writer
                .write_record(&projection.project(&record))
                .map_err(csv_out)?;
            stats.rows_kept += 1;
        }
    }

    let io_out = |source| FilterError::Io {
        path: output_path.to_path_buf(),
        source,
    };
    let file = writer
        .into_inner()
        .map_err(|err| io_out(err.into_error()))?
        .into_inner()
        .map_err(|err| io_out(err.into_error()))?;
    file.sync_all().map_err(io_out)?;

    Ok(stats)
}

fn removed_columns(rules: &DatasetRules) -> String {
    rules
        .excluded_fields
        .excluded
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
