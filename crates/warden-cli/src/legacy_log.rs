//! Reader for the CSV access log kept before the SQLite store.
//!
//! Format: a `Timestamp,Event,Person` header, then one
//! `YYYY-mm-dd HH:MM:SS,<event>,<person>` line per event, `N/A` meaning no
//! person.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEntry {
    pub timestamp: String,
    pub event: String,
    pub person: Option<String>,
}

/// Parse the log text. Blank and malformed lines are skipped.
pub fn parse(text: &str) -> Vec<LegacyEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut parts = line.splitn(3, ',');
            let (timestamp, event, person) = (parts.next()?, parts.next()?, parts.next()?);
            if timestamp.is_empty() || event.is_empty() {
                tracing::debug!(line, "skipping malformed legacy log line");
                return None;
            }
            Some(LegacyEntry {
                timestamp: timestamp.trim().to_string(),
                event: event.trim().to_string(),
                person: Some(person.trim())
                    .filter(|p| !p.is_empty() && *p != "N/A")
                    .map(str::to_string),
            })
        })
        .collect()
}
