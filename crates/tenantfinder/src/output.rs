use crate::aggregate::HostEntry;
use crate::utils::ensure_dir;
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

// region:        --- Records

#[derive(Debug, Serialize)]
struct JsonSourceResult<'a> {
    domain: &'a str,
    input: &'a str,
    source: &'a str,
}

#[derive(Debug, Serialize)]
struct JsonSourcesResult<'a> {
    domain: &'a str,
    input: &'a str,
    sources: Vec<&'a str>,
}

// endregion:     --- Records

/// Writes the aggregated hosts of one input domain, as plain lines or JSON lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputWriter {
    json: bool,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Opens `path` for writing, creating missing parent directories.
    pub fn create_file(&self, path: &Path, append: bool) -> Result<File> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                ensure_dir(dir)?;
            }
        }

        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        Ok(file)
    }

    /// One record per unique host with the source that found it first.
    pub fn write_host<W: Write>(
        &self,
        input: &str,
        results: &BTreeMap<String, HostEntry>,
        writer: W,
    ) -> Result<()> {
        let json = self.json;
        buffered(writer, |buf| {
            for entry in results.values() {
                if json {
                    let record = JsonSourceResult {
                        domain: &entry.host,
                        input,
                        source: &entry.source,
                    };
                    serde_json::to_writer(&mut *buf, &record)?;
                    buf.write_all(b"\n")?;
                } else {
                    writeln!(buf, "{}", entry.host)?;
                }
            }
            Ok(())
        })
    }

    /// One record per unique host with every source that reported it.
    pub fn write_source_host<W: Write>(
        &self,
        input: &str,
        sources: &BTreeMap<String, BTreeSet<String>>,
        writer: W,
    ) -> Result<()> {
        let json = self.json;
        buffered(writer, |buf| {
            for (host, found_by) in sources {
                let found_by: Vec<&str> = found_by.iter().map(String::as_str).collect();
                if json {
                    let record = JsonSourcesResult {
                        domain: host,
                        input,
                        sources: found_by,
                    };
                    serde_json::to_writer(&mut *buf, &record)?;
                    buf.write_all(b"\n")?;
                } else {
                    writeln!(buf, "{},[{}]", host, found_by.join(","))?;
                }
            }
            Ok(())
        })
    }
}

/// Runs `body` against a buffered `writer` and flushes whether or not it failed.
fn buffered<W, F>(writer: W, body: F) -> Result<()>
where
    W: Write,
    F: FnOnce(&mut BufWriter<W>) -> Result<()>,
{
    let mut buf = BufWriter::new(writer);
    let written = body(&mut buf);
    let flushed = buf.flush();
    written?;
    flushed?;
    Ok(())
}
