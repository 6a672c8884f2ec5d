use super::ReportRecord;
use chrono::{DateTime, Local};
use std::io::{self, Write};

/// Column header written after the metadata line
pub const HEADER_LINE: &str = "device API id, Default Name, IPAddress, Display Name, MAC Address";

/// Describes where a report came from, for its first line
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    pub host: String,
    pub lookback_days: u32,
    pub generated_at: DateTime<Local>,
}

impl ReportMetadata {
    pub fn now(host: &str, lookback_days: u32) -> Self {
        Self {
            host: host.to_string(),
            lookback_days,
            generated_at: Local::now(),
        }
    }

    pub fn comment_line(&self) -> String {
        format!(
            "# Generated from ExtraHop appliance at {}. Non-compliant device names in the last {} days as at {}.",
            self.host,
            self.lookback_days,
            self.generated_at.format("%c")
        )
    }
}

/// Writes the CSV report: metadata comment, header, then one line per record.
pub struct ReportWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> ReportWriter<W> {
    /// Start a report, writing the metadata and header lines immediately
    pub fn new(mut out: W, metadata: &ReportMetadata) -> io::Result<Self> {
        writeln!(out, "{}", metadata.comment_line())?;
        writeln!(out, "{}", HEADER_LINE)?;
        Ok(Self { out, written: 0 })
    }

    pub fn write_record(&mut self, record: &ReportRecord) -> io::Result<()> {
        writeln!(self.out, "{}", record)?;
        self.written += 1;
        Ok(())
    }

    /// Drain `records` into the report, returning how many were written
    pub fn write_all<I>(&mut self, records: I) -> io::Result<usize>
    where
        I: IntoIterator<Item = ReportRecord>,
    {
        let before = self.written;
        for record in records {
            self.write_record(&record)?;
        }
        Ok(self.written - before)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
