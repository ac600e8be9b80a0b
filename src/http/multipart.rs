//! Multipart form data parser
//!
//! Parts are separated by `--boundary` delimiters. Each part carries a
//! header block and content split on the first blank line. A part with a
//! `filename` is spooled to disk and exposed as an [`UploadedFile`]; other
//! parts become trimmed text fields. Parts without a usable
//! `Content-Disposition` are skipped.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::logger;

const MAX_BOUNDARY_LEN: usize = 256;

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Field name to every value submitted under it
pub type MultipartForm = HashMap<String, Vec<MultipartValue>>;

#[derive(Debug)]
pub enum MultipartValue {
    Field(String),
    File(UploadedFile),
}

impl MultipartValue {
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(text) => Some(text),
            Self::File(_) => None,
        }
    }

    pub const fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            Self::File(file) => Some(file),
            Self::Field(_) => None,
        }
    }
}

/// A file part spooled to disk
///
/// The backing file is deleted when the value is dropped, which happens
/// when the owning request is dropped after its response is written.
#[derive(Debug)]
pub struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    path: PathBuf,
    size: u64,
}

impl UploadedFile {
    /// Client-supplied filename
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Storage handle for the spooled content
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Copy the content somewhere that outlives the request
    pub fn copy_to(&self, dest: impl AsRef<Path>) -> io::Result<u64> {
        std::fs::copy(&self.path, dest)
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                logger::log_warning(&format!(
                    "Failed to remove upload {}: {e}",
                    self.path.display()
                ));
            }
        }
    }
}

/// Extract the boundary from a `multipart/form-data` Content-Type value
pub fn parse_boundary(content_type: &str) -> Result<String> {
    for param in split_params(content_type).into_iter().skip(1) {
        let Some((key, value)) = param.trim().split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(value);
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(Error::BodyParse("invalid multipart boundary".to_string()));
            }
            return Ok(boundary.to_string());
        }
    }

    Err(Error::BodyParse(
        "missing boundary in multipart Content-Type".to_string(),
    ))
}

/// Parse a multipart body, spooling file parts below `upload_dir`
pub fn parse(body: &[u8], boundary: &str, upload_dir: &Path) -> Result<MultipartForm> {
    let delimiter = format!("--{boundary}");
    let mut form = MultipartForm::new();

    for chunk in split_on(body, delimiter.as_bytes()).into_iter().skip(1) {
        if chunk.starts_with(b"--") {
            break;
        }
        let part = strip_line_break_prefix(chunk);
        if part.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let Some((head, content)) = split_head(part) else {
            continue;
        };
        let content = strip_line_break_suffix(content);
        let headers = parse_part_headers(head);

        let Some((name, filename)) = headers
            .get("content-disposition")
            .and_then(|value| parse_content_disposition(value))
        else {
            logger::log_warning("Skipping multipart part without Content-Disposition name");
            continue;
        };

        let value = match filename {
            Some(filename) => MultipartValue::File(spool(
                upload_dir,
                filename,
                headers.get("content-type").cloned(),
                content,
            )?),
            None => MultipartValue::Field(String::from_utf8_lossy(content).trim().to_string()),
        };
        form.entry(name).or_default().push(value);
    }

    Ok(form)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn split_on<'a>(body: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while let Some(pos) = find(body, delimiter, start) {
        chunks.push(&body[start..pos]);
        start = pos + delimiter.len();
    }
    chunks.push(&body[start..]);
    chunks
}

fn strip_line_break_prefix(part: &[u8]) -> &[u8] {
    part.strip_prefix(b"\r\n")
        .or_else(|| part.strip_prefix(b"\n"))
        .unwrap_or(part)
}

fn strip_line_break_suffix(content: &[u8]) -> &[u8] {
    content
        .strip_suffix(b"\r\n")
        .or_else(|| content.strip_suffix(b"\n"))
        .unwrap_or(content)
}

/// Split a part into header block and content on the first blank line
fn split_head(part: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find(part, b"\r\n\r\n", 0) {
        return Some((&part[..pos], &part[pos + 4..]));
    }
    find(part, b"\n\n", 0).map(|pos| (&part[..pos], &part[pos + 2..]))
}

fn parse_part_headers(head: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

/// Recover `name` and optional `filename` from a Content-Disposition value
fn parse_content_disposition(value: &str) -> Option<(String, Option<String>)> {
    let mut name = None;
    let mut filename = None;

    for param in split_params(value).into_iter().skip(1) {
        let Some((key, raw_value)) = param.trim().split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw_value).to_string());
        } else if key.eq_ignore_ascii_case("filename") {
            filename = Some(unquote(raw_value).to_string());
        }
    }

    name.map(|name| (name, filename))
}

/// Split a header value on `;`, leaving `;` inside double quotes intact
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn spool(
    upload_dir: &Path,
    filename: String,
    content_type: Option<String>,
    content: &[u8],
) -> Result<UploadedFile> {
    let (path, mut file) = create_spool_file(upload_dir)?;
    let upload = UploadedFile {
        filename,
        content_type,
        path,
        size: u64::try_from(content.len()).unwrap_or(u64::MAX),
    };
    // `upload` removes the file again if the write fails
    file.write_all(content)?;
    Ok(upload)
}

fn create_spool_file(upload_dir: &Path) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(upload_dir)?;
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    for _ in 0..32 {
        let counter = UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = upload_dir.join(format!(
            "expressway-upload-{}-{ts_nanos}-{counter}.tmp",
            std::process::id()
        ));

        match OpenOptions::new().create_new(true).write(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not allocate a unique upload file",
    ))
}
