//! Access records and their two log lines.
//!
//! Each completed request yields one [`AccessRecord`]. It is rendered twice:
//! the access line from a `${tag}` template, written raw to the sink, and the
//! body-preview line, logged at info level.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, Local, SecondsFormat};

use crate::http::body::BodyPreview;
use crate::http::content::is_printable;

/// One completed request/response exchange.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub timestamp: DateTime<Local>,
    pub method: String,
    pub uri: String,
    pub path: String,
    pub protocol: String,
    pub host: String,
    pub remote_ip: String,
    pub referer: String,
    pub user_agent: String,
    pub status: u16,
    pub latency: Duration,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub request_id: String,
    pub error: Option<String>,
    pub request_headers: HeaderMap,
    pub response_content_type: String,
    pub request_body: BodyPreview,
    pub response_body: BodyPreview,
}

/// What the body-preview line shows for the response.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponsePreview<'a> {
    /// Captured prefix, decoded for display.
    Text(Cow<'a, str>),
    /// Placeholder naming the content type; raw bytes withheld.
    Opaque(&'a str),
}

impl AccessRecord {
    /// Response side of the preview line. Empty bodies are always shown.
    pub fn response_preview(&self) -> ResponsePreview<'_> {
        if is_printable(&self.response_content_type) || self.response_body.total() == 0 {
            ResponsePreview::Text(self.response_body.text())
        } else {
            ResponsePreview::Opaque(&self.response_content_type)
        }
    }

    /// `url, reqBody[<bytes_in>]:{<preview>}, resBody[<len>]:{<preview>}`
    pub fn body_line(&self) -> String {
        let request = self.request_body.text();
        match self.response_preview() {
            ResponsePreview::Text(response) => format!(
                "{}, reqBody[{}]:{{{}}}, resBody[{}]:{{{}}}",
                self.uri,
                self.bytes_in,
                request,
                self.response_body.total(),
                response
            ),
            ResponsePreview::Opaque(content_type) => format!(
                "{}, reqBody[{}]:{{{}}}, resBody[{}]:[Non-printable ContentType:{}]",
                self.uri,
                self.bytes_in,
                request,
                self.response_body.total(),
                content_type
            ),
        }
    }

    fn query_value(&self, name: &str) -> &str {
        let query = self.uri.split_once('?').map(|(_, q)| q).unwrap_or("");
        query
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    TimeUnix,
    TimeUnixMilli,
    TimeUnixMicro,
    TimeUnixNano,
    TimeRfc3339,
    TimeRfc3339Nano,
    TimeCustom,
    Id,
    RemoteIp,
    Uri,
    Host,
    Method,
    Path,
    Protocol,
    Referer,
    UserAgent,
    Status,
    Error,
    Latency,
    LatencyHuman,
    BytesIn,
    BytesOut,
    Header(String),
    Query(String),
    Unknown,
}

impl Tag {
    fn parse(name: &str) -> Self {
        if let Some(header) = name.strip_prefix("header:") {
            return Tag::Header(header.to_string());
        }
        if let Some(query) = name.strip_prefix("query:") {
            return Tag::Query(query.to_string());
        }
        match name {
            "time_unix" => Tag::TimeUnix,
            "time_unix_milli" => Tag::TimeUnixMilli,
            "time_unix_micro" => Tag::TimeUnixMicro,
            "time_unix_nano" => Tag::TimeUnixNano,
            "time_rfc3339" => Tag::TimeRfc3339,
            "time_rfc3339_nano" => Tag::TimeRfc3339Nano,
            "time_custom" => Tag::TimeCustom,
            "id" => Tag::Id,
            "remote_ip" => Tag::RemoteIp,
            "uri" => Tag::Uri,
            "host" => Tag::Host,
            "method" => Tag::Method,
            "path" => Tag::Path,
            "protocol" => Tag::Protocol,
            "referer" => Tag::Referer,
            "user_agent" => Tag::UserAgent,
            "status" => Tag::Status,
            "error" => Tag::Error,
            "latency" => Tag::Latency,
            "latency_human" => Tag::LatencyHuman,
            "bytes_in" => Tag::BytesIn,
            "bytes_out" => Tag::BytesOut,
            _ => Tag::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Tag(Tag),
}

/// Compiled access line template.
#[derive(Debug, Clone)]
pub struct AccessFormat {
    segments: Vec<Segment>,
    custom_time: String,
}

impl AccessFormat {
    /// Compile `template`. Unknown tags render empty; an unclosed `${` is literal.
    pub fn parse(template: &str, custom_time_format: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                break;
            };
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            segments.push(Segment::Tag(Tag::parse(&after[..end])));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Self {
            segments,
            custom_time: custom_time_format.to_string(),
        }
    }

    /// Render one access line for `record`.
    pub fn render(&self, record: &AccessRecord) -> String {
        let mut out = String::with_capacity(256);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Tag(tag) => self.render_tag(&mut out, tag, record),
            }
        }
        out
    }

    fn render_tag(&self, out: &mut String, tag: &Tag, record: &AccessRecord) {
        let ts = &record.timestamp;
        // Writing into a String only fails on a bad strftime layout, which
        // config validation rejects; a partial field is acceptable then.
        let _ = match tag {
            Tag::TimeUnix => write!(out, "{}", ts.timestamp()),
            Tag::TimeUnixMilli => write!(out, "{}", ts.timestamp_millis()),
            Tag::TimeUnixMicro => write!(out, "{}", ts.timestamp_micros()),
            Tag::TimeUnixNano => write!(out, "{}", ts.timestamp_nanos_opt().unwrap_or_default()),
            Tag::TimeRfc3339 => write!(out, "{}", ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Tag::TimeRfc3339Nano => {
                write!(out, "{}", ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
            Tag::TimeCustom => write!(out, "{}", ts.format(&self.custom_time)),
            Tag::Id => write!(out, "{}", record.request_id),
            Tag::RemoteIp => write!(out, "{}", record.remote_ip),
            Tag::Uri => write!(out, "{}", record.uri),
            Tag::Host => write!(out, "{}", record.host),
            Tag::Method => write!(out, "{}", record.method),
            Tag::Path => write!(out, "{}", record.path),
            Tag::Protocol => write!(out, "{}", record.protocol),
            Tag::Referer => write!(out, "{}", record.referer),
            Tag::UserAgent => write!(out, "{}", record.user_agent),
            Tag::Status => write!(out, "{}", record.status),
            Tag::Error => match &record.error {
                Some(message) => write!(out, "{}", escape_error(message)),
                None => Ok(()),
            },
            Tag::Latency => write!(out, "{}", record.latency.as_nanos()),
            Tag::LatencyHuman => write!(out, "{:?}", record.latency),
            Tag::BytesIn => write!(out, "{}", record.bytes_in),
            Tag::BytesOut => write!(out, "{}", record.bytes_out),
            Tag::Header(name) => {
                let value = record
                    .request_headers
                    .get(name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                write!(out, "{value}")
            }
            Tag::Query(name) => write!(out, "{}", record.query_value(name)),
            Tag::Unknown => Ok(()),
        };
    }
}

/// JSON string escaping without the surrounding quotes.
fn escape_error(message: &str) -> String {
    match serde_json::to_string(message) {
        Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
        Err(_) => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{DEFAULT_ACCESS_FORMAT, DEFAULT_CUSTOM_TIME_FORMAT};
    use crate::http::body::PREVIEW_LIMIT;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    fn preview(data: &[u8]) -> BodyPreview {
        let mut p = BodyPreview::new();
        p.record(data);
        p
    }

    fn record() -> AccessRecord {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        AccessRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
            method: "POST".into(),
            uri: "/orders?page=2&sort=asc".into(),
            path: "/orders".into(),
            protocol: "HTTP/1.1".into(),
            host: "api.example.com".into(),
            remote_ip: "10.0.0.7".into(),
            referer: String::new(),
            user_agent: "curl/8.0".into(),
            status: 201,
            latency: Duration::from_micros(1500),
            bytes_in: 10,
            bytes_out: 8,
            request_id: "req-1".into(),
            error: None,
            request_headers: headers,
            response_content_type: "application/json".into(),
            request_body: preview(b"{\"qty\": 1}"),
            response_body: preview(b"{\"id\":7}"),
        }
    }

    #[test]
    fn default_format_renders_all_fields() {
        let format = AccessFormat::parse(DEFAULT_ACCESS_FORMAT, DEFAULT_CUSTOM_TIME_FORMAT);
        let line = format.render(&record());

        let ts = record().timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        assert_eq!(
            line,
            format!("{ts} 201 POST 1.5ms api.example.com 10.0.0.7 10 8 /orders?page=2&sort=asc req-1 \n")
        );
    }

    #[test]
    fn header_query_and_unknown_tags() {
        let format = AccessFormat::parse(
            "${header:x-tenant}|${query:sort}|${query:missing}|${nope}|${path}",
            DEFAULT_CUSTOM_TIME_FORMAT,
        );
        assert_eq!(format.render(&record()), "acme|asc|||/orders");
    }

    #[test]
    fn unterminated_tag_is_literal() {
        let format = AccessFormat::parse("${status} ${method", DEFAULT_CUSTOM_TIME_FORMAT);
        assert_eq!(format.render(&record()), "201 ${method");
    }

    #[test]
    fn custom_time_and_latency() {
        let format = AccessFormat::parse("${time_custom} ${latency}", "%Y/%m/%d %H:%M:%S");
        assert_eq!(format.render(&record()), "2024/03/01 12:30:45 1500000");
    }

    #[test]
    fn error_is_json_escaped() {
        let mut r = record();
        r.error = Some("bad \"input\"\nline".into());
        let format = AccessFormat::parse("[${error}]", DEFAULT_CUSTOM_TIME_FORMAT);
        assert_eq!(format.render(&r), "[bad \\\"input\\\"\\nline]");
    }

    #[test]
    fn body_line_printable() {
        assert_eq!(
            record().body_line(),
            "/orders?page=2&sort=asc, reqBody[10]:{{\"qty\": 1}}, resBody[8]:{{\"id\":7}}"
        );
    }

    #[test]
    fn body_line_reports_full_request_length() {
        let mut r = record();
        r.bytes_in = 200_000;
        r.request_body = preview(&[b'z'; 16_384]);
        let expected = format!("reqBody[200000]:{{{}}}", "z".repeat(PREVIEW_LIMIT));
        assert!(r.body_line().contains(&expected));
    }

    #[test]
    fn body_line_opaque_response() {
        let mut r = record();
        r.response_content_type = "application/octet-stream".into();
        r.response_body = preview(&[0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(
            r.response_preview(),
            ResponsePreview::Opaque("application/octet-stream")
        );
        assert!(r
            .body_line()
            .ends_with("resBody[10]:[Non-printable ContentType:application/octet-stream]"));
    }

    #[test]
    fn empty_opaque_response_is_shown() {
        let mut r = record();
        r.response_content_type = "image/png".into();
        r.response_body = BodyPreview::new();
        assert_eq!(r.response_preview(), ResponsePreview::Text(Cow::Borrowed("")));
        assert!(r.body_line().ends_with("resBody[0]:{}"));
    }

    #[test]
    fn request_preview_shown_for_binary_request() {
        let mut r = record();
        r.request_body = preview(&[b'a'; 3000]);
        r.bytes_in = 3000;
        let line = r.body_line();
        let expected = format!("reqBody[3000]:{{{}}}", "a".repeat(PREVIEW_LIMIT));
        assert!(line.contains(&expected));
    }
}
