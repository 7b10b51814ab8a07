//! WebDAV XML bodies: PROPFIND request/response and LOCK request/response
//! (RFC 4918), per spec.md §4.10 and §6.
//!
//! Keeps the teacher's `Writer`/`BytesStart`/`BytesEnd` event-by-event
//! construction shape from `webdav_adapter.rs`, ported from the older
//! `quick_xml::Reader::read_event(&mut buf)` API to the current `quick-xml`
//! 0.37 API (`Reader::from_str` + `read_event()`, `BytesStart::new` instead
//! of `::owned`, `Writer::write_event` without a scratch buffer argument).

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use quick_xml::Writer;

use crate::date::{format_iso8601, format_rfc1123};
use crate::percent::escape_href_path;

/// Which properties a PROPFIND response must include, per spec.md §4.10:
/// `<allprop>` or an empty body means all four; `<prop>` names a subset of
/// `resourcetype`/`creationdate`/`getlastmodified`/`getcontentlength`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropfindScope {
    AllProps,
    PropNameOnly,
    Named(Vec<String>),
}

impl PropfindScope {
    fn wants(&self, name: &str) -> bool {
        match self {
            PropfindScope::AllProps => true,
            PropfindScope::PropNameOnly => true,
            PropfindScope::Named(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Parses a PROPFIND request body. An empty body means "all properties",
/// matching spec.md §4.10's "empty body ⇒ all four".
pub fn parse_propfind_body(body: &[u8]) -> PropfindScope {
    if body.is_empty() {
        return PropfindScope::AllProps;
    }
    let text = match std::str::from_utf8(body) {
        Ok(t) => t,
        Err(_) => return PropfindScope::AllProps,
    };

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut inside_prop = false;
    let mut names = Vec::new();
    let mut scope = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = local_name(&e);
                match local.as_str() {
                    "allprop" => scope = Some(PropfindScope::AllProps),
                    "propname" => scope = Some(PropfindScope::PropNameOnly),
                    "prop" => inside_prop = true,
                    other if inside_prop => names.push(other.to_string()),
                    _ => {}
                }
            }
            Ok(Event::End(e)) if local_name_end(&e) == "prop" => inside_prop = false,
            Ok(Event::Eof) => break,
            Err(_) => return PropfindScope::AllProps,
            _ => {}
        }
    }

    if !names.is_empty() {
        return PropfindScope::Named(names);
    }
    scope.unwrap_or(PropfindScope::AllProps)
}

fn local_name(e: &BytesStart) -> String {
    let name = e.name();
    let full = String::from_utf8_lossy(name.as_ref());
    full.rsplit(':').next().unwrap_or(&full).to_string()
}

fn local_name_end(e: &BytesEnd) -> String {
    let name = e.name();
    let full = String::from_utf8_lossy(name.as_ref());
    full.rsplit(':').next().unwrap_or(&full).to_string()
}

/// One resource's metadata for a Multi-Status response.
pub struct PropfindEntry {
    pub href: String,
    pub is_collection: bool,
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Writes a `207 Multi-Status` document per spec.md §4.10/§6: `DAV:` bound
/// to prefix `D`, UTF-8 with an XML declaration, collections identified by
/// `<D:resourcetype><D:collection/></D:resourcetype>`, hrefs percent-escaped
/// with the WebDAV-widened character set.
pub fn write_multistatus(entries: &[PropfindEntry], scope: &PropfindScope) -> String {
    let mut buf = Vec::new();
    let mut writer = Writer::new(&mut buf);

    let _ = writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)));

    let mut multistatus = BytesStart::new("D:multistatus");
    multistatus.push_attribute(("xmlns:D", "DAV:"));
    let _ = writer.write_event(Event::Start(multistatus));

    for entry in entries {
        write_response(&mut writer, entry, scope);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("D:multistatus")));

    String::from_utf8(buf).unwrap_or_default()
}

fn write_response(writer: &mut Writer<&mut Vec<u8>>, entry: &PropfindEntry, scope: &PropfindScope) {
    let _ = writer.write_event(Event::Start(BytesStart::new("D:response")));

    let _ = writer.write_event(Event::Start(BytesStart::new("D:href")));
    let href = escape_href_path(&entry.href);
    let _ = writer.write_event(Event::Text(BytesText::new(&href)));
    let _ = writer.write_event(Event::End(BytesEnd::new("D:href")));

    let _ = writer.write_event(Event::Start(BytesStart::new("D:propstat")));
    let _ = writer.write_event(Event::Start(BytesStart::new("D:prop")));

    if scope.wants("resourcetype") {
        if entry.is_collection {
            let _ = writer.write_event(Event::Start(BytesStart::new("D:resourcetype")));
            let _ = writer.write_event(Event::Empty(BytesStart::new("D:collection")));
            let _ = writer.write_event(Event::End(BytesEnd::new("D:resourcetype")));
        } else {
            let _ = writer.write_event(Event::Empty(BytesStart::new("D:resourcetype")));
        }
    }

    if scope.wants("creationdate") {
        if let Some(created) = entry.creation_date {
            write_text_element(writer, "D:creationdate", &format_iso8601(created));
        }
    }

    if scope.wants("getlastmodified") {
        if let Some(modified) = entry.last_modified {
            write_text_element(writer, "D:getlastmodified", &format_rfc1123(modified));
        }
    }

    if scope.wants("getcontentlength") && !entry.is_collection {
        if let Some(len) = entry.content_length {
            write_text_element(writer, "D:getcontentlength", &len.to_string());
        }
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("D:prop")));
    write_text_element(writer, "D:status", "HTTP/1.1 200 OK");
    let _ = writer.write_event(Event::End(BytesEnd::new("D:propstat")));
    let _ = writer.write_event(Event::End(BytesEnd::new("D:response")));
}

fn write_text_element(writer: &mut Writer<&mut Vec<u8>>, tag: &str, text: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(tag)));
    let _ = writer.write_event(Event::Text(BytesText::new(text)));
    let _ = writer.write_event(Event::End(BytesEnd::new(tag)));
}

/// A parsed LOCK request body (RFC 4918 §9.10). Only
/// `exclusive`/`write`/`Depth: 0` locks are supported, per spec.md §4.10.
pub struct LockRequest {
    pub exclusive: bool,
    pub write_lock: bool,
    pub owner: Option<String>,
}

/// Parses a LOCK request body, recognizing `<lockscope>`, `<locktype>`, and
/// `<owner>`. A missing scope/type defaults to `exclusive`/`write` (the only
/// combination this server accepts), matching macOS Finder's own request
/// shape.
pub fn parse_lock_body(body: &[u8]) -> LockRequest {
    let mut request = LockRequest {
        exclusive: true,
        write_lock: true,
        owner: None,
    };
    if body.is_empty() {
        return request;
    }
    let text = match std::str::from_utf8(body) {
        Ok(t) => t,
        Err(_) => return request,
    };

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut in_owner = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "shared" => request.exclusive = false,
                    "exclusive" => request.exclusive = true,
                    "write" => request.write_lock = true,
                    "owner" => in_owner = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) if local_name_end(&e) == "owner" => in_owner = false,
            Ok(Event::Text(t)) if in_owner => {
                if let Ok(text) = t.unescape() {
                    request.owner = Some(text.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    request
}

/// Writes the synthesized `<D:lockdiscovery>` document a LOCK response
/// returns, with a fresh `urn:uuid:...` token and no persisted state
/// (spec.md §4.10, §9 "pretending to lock").
pub fn write_lockdiscovery(token: &str, owner: Option<&str>) -> String {
    let mut buf = Vec::new();
    let mut writer = Writer::new(&mut buf);

    let _ = writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)));

    let mut prop = BytesStart::new("D:prop");
    prop.push_attribute(("xmlns:D", "DAV:"));
    let _ = writer.write_event(Event::Start(prop));
    let _ = writer.write_event(Event::Start(BytesStart::new("D:lockdiscovery")));
    let _ = writer.write_event(Event::Start(BytesStart::new("D:activelock")));

    let _ = writer.write_event(Event::Start(BytesStart::new("D:locktype")));
    let _ = writer.write_event(Event::Empty(BytesStart::new("D:write")));
    let _ = writer.write_event(Event::End(BytesEnd::new("D:locktype")));

    let _ = writer.write_event(Event::Start(BytesStart::new("D:lockscope")));
    let _ = writer.write_event(Event::Empty(BytesStart::new("D:exclusive")));
    let _ = writer.write_event(Event::End(BytesEnd::new("D:lockscope")));

    write_text_element(&mut writer, "D:depth", "0");

    if let Some(owner) = owner {
        write_text_element(&mut writer, "D:owner", owner);
    }

    let _ = writer.write_event(Event::Start(BytesStart::new("D:locktoken")));
    write_text_element(&mut writer, "D:href", token);
    let _ = writer.write_event(Event::End(BytesEnd::new("D:locktoken")));

    let _ = writer.write_event(Event::End(BytesEnd::new("D:activelock")));
    let _ = writer.write_event(Event::End(BytesEnd::new("D:lockdiscovery")));
    let _ = writer.write_event(Event::End(BytesEnd::new("D:prop")));

    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_means_all_props() {
        assert_eq!(parse_propfind_body(b""), PropfindScope::AllProps);
    }

    #[test]
    fn parses_named_prop_subset() {
        let body = br#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:prop><D:getcontentlength/><D:resourcetype/></D:prop></D:propfind>"#;
        let scope = parse_propfind_body(body);
        match scope {
            PropfindScope::Named(names) => {
                assert!(names.contains(&"getcontentlength".to_string()));
                assert!(names.contains(&"resourcetype".to_string()));
            }
            _ => panic!("expected Named scope"),
        }
    }

    #[test]
    fn multistatus_marks_collections() {
        let entries = vec![
            PropfindEntry {
                href: "/c/".to_string(),
                is_collection: true,
                content_length: None,
                last_modified: None,
                creation_date: None,
            },
            PropfindEntry {
                href: "/b.txt".to_string(),
                is_collection: false,
                content_length: Some(5),
                last_modified: None,
                creation_date: None,
            },
        ];
        let xml = write_multistatus(&entries, &PropfindScope::AllProps);
        assert!(xml.contains("<D:collection/>"));
        assert!(xml.contains("<D:getcontentlength>5</D:getcontentlength>"));
    }

    #[test]
    fn lock_body_defaults_to_exclusive_write() {
        let body = br#"<?xml version="1.0"?><D:lockinfo xmlns:D="DAV:"><D:lockscope><D:exclusive/></D:lockscope><D:locktype><D:write/></D:locktype><D:owner>me</D:owner></D:lockinfo>"#;
        let req = parse_lock_body(body);
        assert!(req.exclusive);
        assert!(req.write_lock);
        assert_eq!(req.owner.as_deref(), Some("me"));
    }
}
