//! Event source: newline-delimited JSON activity events

use std::io::BufRead;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::{ActivityEvent, MalformedEvent};

/// Events parsed from one input, plus the lines that were rejected
#[derive(Debug, Default)]
pub struct IngestBatch {
    pub events: Vec<ActivityEvent>,
    pub rejected: Vec<Rejected>,
}

/// A line that failed boundary validation
#[derive(Debug)]
pub struct Rejected {
    /// 1-based line number
    pub line: usize,
    pub error: MalformedEvent,
}

/// Read JSON lines. Blank lines and `#` comments are skipped; malformed
/// lines (including invalid UTF-8) are logged and collected in `rejected`,
/// never fatal. Only I/O failures abort the read.
pub fn read_events(mut reader: impl BufRead) -> Result<IngestBatch> {
    let mut batch = IngestBatch::default();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let parsed = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                ActivityEvent::from_json(trimmed)
            }
            Err(e) => Err(MalformedEvent::Json(format!("invalid UTF-8: {}", e))),
        };

        match parsed {
            Ok(event) => batch.events.push(event),
            Err(error) => {
                warn!("Dropping malformed event on line {}: {}", line_no, error);
                batch.rejected.push(Rejected {
                    line: line_no,
                    error,
                });
            }
        }
    }

    debug!(
        "Read {} events ({} rejected)",
        batch.events.len(),
        batch.rejected.len()
    );
    Ok(batch)
}
