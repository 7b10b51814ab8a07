//! `multipart/form-data` (RFC 7578) parsing, including nested
//! `multipart/mixed` parts, per spec.md §4.3.
//!
//! Grounded on the boundary-scan approach used by bare-metal HTTP body
//! parsers such as `examples/other_examples/5ae7b5d7_foldright-micro-http__crates-http-src-protocol-body-req_body.rs.rs`:
//! find each `--boundary` delimiter, split headers from content at the
//! first blank line, and recurse for `multipart/mixed` sub-parts.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// A named text field from a multipart form.
#[derive(Debug, Clone)]
pub struct MultipartArgument {
    pub name: String,
    pub value: String,
}

/// A named file field from a multipart form, written to a temp file.
pub struct MultipartFile {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub path: PathBuf,
    pub temp: Option<NamedTempFile>,
}

/// The parsed result of a `multipart/form-data` body. Duplicate control
/// names are preserved in arrival order; spec.md §4.3 requires
/// `firstArgumentForControlName`/`firstFileForControlName` to return the
/// first occurrence.
#[derive(Default)]
pub struct MultipartForm {
    pub arguments: Vec<MultipartArgument>,
    pub files: Vec<MultipartFile>,
}

impl MultipartForm {
    pub fn first_argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn first_file(&self, name: &str) -> Option<&MultipartFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("missing boundary")]
    MissingBoundary,
    #[error("malformed part headers")]
    MalformedHeaders,
    #[error("missing Content-Disposition name")]
    MissingName,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct RawPart<'a> {
    headers: Vec<(String, String)>,
    body: &'a [u8],
}

fn header_lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Splits a multipart body (already stripped of its own leading/trailing
/// boundary noise) into raw parts delimited by `--boundary`.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<RawPart<'a>>, MultipartError> {
    let delim = format!("--{boundary}");
    let delim = delim.as_bytes();
    let mut parts = Vec::new();
    let mut pos = find(body, delim, 0).ok_or(MultipartError::MalformedHeaders)? + delim.len();

    loop {
        // Skip the CRLF after the boundary line, or detect the terminal `--`.
        if body.get(pos..pos + 2) == Some(b"--") {
            break;
        }
        let line_end = find(body, b"\r\n", pos).unwrap_or(body.len());
        pos = line_end + 2;

        let next = find(body, delim, pos).unwrap_or(body.len());
        // Content ends two bytes before the next boundary (trailing CRLF).
        let content_end = if next >= 2 && &body[next - 2..next] == b"\r\n" {
            next - 2
        } else {
            next
        };
        let segment = &body[pos..content_end];

        let header_end = find(segment, b"\r\n\r\n", 0);
        let (header_bytes, part_body) = match header_end {
            Some(idx) => (&segment[..idx], &segment[idx + 4..]),
            None => (segment, &segment[segment.len()..]),
        };
        let headers = parse_part_headers(header_bytes)?;
        parts.push(RawPart {
            headers,
            body: part_body,
        });

        if next >= body.len() || body.get(next + delim.len()..next + delim.len() + 2) == Some(b"--") {
            break;
        }
        pos = next + delim.len();
    }

    Ok(parts)
}

fn parse_part_headers(raw: &[u8]) -> Result<Vec<(String, String)>, MultipartError> {
    let text = std::str::from_utf8(raw).map_err(|_| MultipartError::MalformedHeaders)?;
    let mut headers = Vec::new();
    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
        let (k, v) = line.split_once(':').ok_or(MultipartError::MalformedHeaders)?;
        headers.push((k.trim().to_string(), v.trim().to_string()));
    }
    Ok(headers)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Parses a `Content-Disposition: form-data; name="..."; filename="..."`
/// header value.
fn parse_content_disposition(value: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut filename = None;
    for segment in value.split(';').skip(1) {
        let segment = segment.trim();
        if let Some(v) = segment.strip_prefix("name=") {
            name = Some(v.trim_matches('"').to_string());
        } else if let Some(v) = segment.strip_prefix("filename=") {
            filename = Some(v.trim_matches('"').to_string());
        }
    }
    (name, filename)
}

pub fn extract_boundary(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|seg| seg.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"'))
}

/// Parses a top-level `multipart/form-data` body, recursing into any
/// `multipart/mixed` sub-part (RFC 7578 §4.3, used when a single form field
/// carries multiple files).
pub async fn parse_multipart(
    body: &[u8],
    boundary: &str,
    upload_dir: &Path,
) -> Result<MultipartForm, MultipartError> {
    let mut form = MultipartForm::default();
    collect_parts(body, boundary, upload_dir, &mut form, None).await?;
    Ok(form)
}

async fn collect_parts(
    body: &[u8],
    boundary: &str,
    upload_dir: &Path,
    form: &mut MultipartForm,
    parent_name: Option<&str>,
) -> Result<(), MultipartError> {
    for part in split_parts(body, boundary)? {
        let disposition = header_lookup(&part.headers, "content-disposition")
            .ok_or(MultipartError::MissingName)?;
        let (name, filename) = parse_content_disposition(disposition);
        let content_type = header_lookup(&part.headers, "content-type").map(|s| s.to_string());
        let field_name = name.or_else(|| parent_name.map(|s| s.to_string()));

        if let Some(ct) = &content_type {
            if ct.starts_with("multipart/mixed") {
                if let Some(nested_boundary) = extract_boundary(ct) {
                    Box::pin(collect_parts(
                        part.body,
                        nested_boundary,
                        upload_dir,
                        form,
                        field_name.as_deref(),
                    ))
                    .await?;
                    continue;
                }
            }
        }

        let field_name = field_name.ok_or(MultipartError::MissingName)?;

        if let Some(filename) = filename {
            let mut temp = NamedTempFile::new_in(upload_dir)?;
            temp.as_file_mut().write_all(part.body)?;
            let path = temp.path().to_path_buf();
            form.files.push(MultipartFile {
                name: field_name,
                filename: Some(filename),
                content_type,
                path,
                temp: Some(temp),
            });
        } else {
            let value = String::from_utf8_lossy(part.body).into_owned();
            form.arguments.push(MultipartArgument {
                name: field_name,
                value,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_text_and_file_fields() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = "XYZ";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nfile contents\r\n\
             --{b}--\r\n",
            b = boundary
        );

        let form = parse_multipart(body.as_bytes(), boundary, dir.path())
            .await
            .unwrap();

        assert_eq!(form.first_argument("title"), Some("hello"));
        let file = form.first_file("file").unwrap();
        assert_eq!(file.filename.as_deref(), Some("a.txt"));
        let contents = std::fs::read_to_string(&file.path).unwrap();
        assert_eq!(contents, "file contents");
    }

    #[tokio::test]
    async fn preserves_duplicate_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = "B1";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"tag\"\r\n\r\nfirst\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"tag\"\r\n\r\nsecond\r\n\
             --{b}--\r\n",
            b = boundary
        );

        let form = parse_multipart(body.as_bytes(), boundary, dir.path())
            .await
            .unwrap();

        assert_eq!(form.arguments.len(), 2);
        assert_eq!(form.arguments[0].value, "first");
        assert_eq!(form.arguments[1].value, "second");
        assert_eq!(form.first_argument("tag"), Some("first"));
    }
}
