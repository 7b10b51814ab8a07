//! Conditional-GET revalidation: the default `override` hook run between a
//! handler's response and the wire write (spec.md §4.8).
//!
//! Supplements the distilled spec's If-None-Match/If-Modified-Since pair
//! with the write-side counterpart, If-Match/If-Unmodified-Since, the way a
//! complete HTTP/1.1 stack (e.g. RFC 7232) pairs read and write
//! preconditions; see SPEC_FULL.md and DESIGN.md's Open Question notes.

use chrono::{DateTime, Utc};

use crate::date::parse_rfc1123;
use crate::request::Request;
use crate::response::Response;

/// `override` only applies to 2xx responses carrying an `ETag` or
/// `Last-Modified`; returns `Some(new_status)` when the caller should
/// rewrite `resp` to a bodiless response at that status while preserving
/// `ETag`/`Last-Modified`/`Cache-Control`.
///
/// Takes the request's method and relevant header values rather than the
/// whole `Request`, since the `Connection` must evaluate this after the
/// `Request` has already been moved into the handler's `process` call.
pub fn evaluate(
    method: &str,
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    resp: &Response,
) -> Option<u16> {
    if !(200..300).contains(&resp.status) {
        return None;
    }
    if resp.etag.is_none() && resp.last_modified.is_none() {
        return None;
    }

    let not_modified = if let Some(inm) = if_none_match {
        etag_matches(inm, resp.etag.as_deref())
    } else if let Some(ims) = if_modified_since {
        parse_rfc1123(ims)
            .map(|since| resp.last_modified.map(|lm| lm <= since).unwrap_or(false))
            .unwrap_or(false)
    } else {
        false
    };

    if !not_modified {
        return None;
    }

    Some(if matches!(method, "GET" | "HEAD") { 304 } else { 412 })
}

/// Convenience wrapper over [`evaluate`] for callers that still hold the
/// full `Request`.
pub fn evaluate_request(req: &Request, resp: &Response) -> Option<u16> {
    evaluate(&req.method, req.header("if-none-match"), req.header("if-modified-since"), resp)
}

/// Write-side preconditions: `If-Match`/`If-Unmodified-Since`, checked
/// before a mutating handler runs. Returns `true` when the precondition
/// fails and the request should be aborted with 412.
pub fn write_precondition_fails(req: &Request, current_etag: Option<&str>, current_last_modified: Option<DateTime<Utc>>) -> bool {
    if let Some(im) = req.header("if-match") {
        if !etag_matches(im, current_etag) {
            return true;
        }
    }
    if let Some(ius) = req.header("if-unmodified-since") {
        if let Some(since) = parse_rfc1123(ius) {
            if current_last_modified.map(|lm| lm > since).unwrap_or(false) {
                return true;
            }
        }
    }
    false
}

fn etag_matches(header_value: &str, etag: Option<&str>) -> bool {
    let etag = match etag {
        Some(e) => e,
        None => return false,
    };
    if header_value.trim() == "*" {
        return true;
    }
    header_value
        .split(',')
        .map(|v| v.trim().trim_start_matches("W/").trim_matches('"'))
        .any(|v| v == etag)
}
