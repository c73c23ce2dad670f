// XML codec for the device-cloud web services
//
// The monitor endpoints speak XML in both directions. Request documents
// and list responses go through quick-xml's serde support; the handful of
// places that only need one element (the `<location>` of a created
// monitor, an embedded `<error>`) use the pull reader directly.

use std::fmt;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::monitor::MonitorMetadata;

// ── Request documents ───────────────────────────────────────────────

/// Body of `POST /ws/Monitor`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "Monitor")]
pub(crate) struct MonitorDocument<'a> {
    #[serde(rename = "monTopic")]
    pub topic: &'a str,
    #[serde(rename = "monBatchSize")]
    pub batch_size: u32,
    #[serde(rename = "monBatchDuration")]
    pub batch_duration: u64,
    #[serde(rename = "monFormatType")]
    pub format_type: &'a str,
    #[serde(rename = "monTransportType")]
    pub transport_type: &'a str,
    #[serde(rename = "monCompression")]
    pub compression: &'a str,
    #[serde(rename = "monSchemaType", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<&'a str>,
    #[serde(rename = "monSchemaData", skip_serializing_if = "Option::is_none")]
    pub schema_data: Option<&'a str>,
}

impl MonitorDocument<'_> {
    pub(crate) fn to_xml(&self) -> Result<String, Error> {
        quick_xml::se::to_string(self).map_err(|e| Error::Encoding {
            message: e.to_string(),
        })
    }
}

// ── Responses ───────────────────────────────────────────────────────

/// `GET /ws/Monitor` answer: `<result><Monitor>…</Monitor>…</result>`.
#[derive(Debug, Deserialize)]
struct MonitorList {
    #[serde(rename = "Monitor", default)]
    monitors: Vec<MonitorMetadata>,
}

pub(crate) fn parse_monitor_list(body: &str) -> Result<Vec<MonitorMetadata>, Error> {
    quick_xml::de::from_str::<MonitorList>(body)
        .map(|list| list.monitors)
        .map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        })
}

/// Parse the monitor id out of a creation answer.
///
/// The device cloud answers `<result><location>Monitor/{id}</location></result>`.
/// A missing location, a non-numeric id, or id `0` is malformed.
pub(crate) fn parse_created_monitor_id(body: &str) -> Result<u64, Error> {
    let malformed = |message: &str| Error::MalformedResponse {
        message: message.to_owned(),
        body: body.to_owned(),
    };

    let location = element_text(body, b"location")
        .ok_or_else(|| malformed("monitor creation answer has no <location>"))?;
    let id = location
        .rsplit('/')
        .next()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .ok_or_else(|| malformed("monitor location does not end in a numeric id"))?;
    if id == 0 {
        return Err(malformed("device cloud assigned monitor id 0"));
    }
    Ok(id)
}

/// Text of the first element named `name`, at any depth.
fn element_text(body: &str, name: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == name => inside = true,
            Ok(Event::Text(t)) if inside => {
                return t.unescape().ok().map(|s| s.into_owned());
            }
            Ok(Event::CData(c)) if inside => {
                return String::from_utf8(c.into_inner().into_owned()).ok();
            }
            Ok(Event::End(e)) if inside && e.local_name().as_ref() == name => return None,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

// ── Device-reported errors ──────────────────────────────────────────

/// An error reported inside a device-cloud response body.
///
/// Web-service and device errors come back as
/// `<error id="…"><desc>…</desc><hint>…</hint></error>` or as a bare
/// `<error>text</error>`. Bodies that are not well-formed XML fall back to
/// `Raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCloudError {
    Structured {
        id: Option<String>,
        message: String,
        hint: Option<String>,
    },
    Raw(String),
}

impl DeviceCloudError {
    /// Extract an embedded error from a response body, if there is one.
    pub fn from_body(body: &str) -> Option<Self> {
        if let Some(err) = parse_error_element(body) {
            return Some(err);
        }
        if let Some(inner) = substring_between(body, "<error>", "</error>") {
            return Some(Self::Raw(inner.trim().to_owned()));
        }
        if body.contains("CCAPI Error") || body.contains("not registered") {
            return Some(Self::Raw(body.trim().to_owned()));
        }
        None
    }

    /// The human-readable part of the error.
    pub fn message(&self) -> &str {
        match self {
            Self::Structured { message, .. } => message,
            Self::Raw(text) => text,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Structured { hint, .. } => hint.as_deref(),
            Self::Raw(_) => None,
        }
    }
}

impl fmt::Display for DeviceCloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())?;
        if let Some(hint) = self.hint() {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeviceCloudError {}

#[derive(Clone, Copy)]
enum ErrorPart {
    Text,
    Desc,
    Hint,
    Other,
}

fn parse_error_element(body: &str) -> Option<DeviceCloudError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut in_error = false;
    let mut id = None;
    let mut text = String::new();
    let mut desc = String::new();
    let mut hint = String::new();
    let mut part = ErrorPart::Other;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if !in_error && name.as_ref() == b"error" {
                    in_error = true;
                    part = ErrorPart::Text;
                    id = e
                        .try_get_attribute("id")
                        .ok()
                        .flatten()
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                } else if in_error {
                    part = match name.as_ref() {
                        b"desc" => ErrorPart::Desc,
                        b"hint" => ErrorPart::Hint,
                        _ => ErrorPart::Other,
                    };
                }
            }
            Ok(Event::Text(t)) if in_error => {
                let Ok(chunk) = t.unescape() else { return None };
                match part {
                    ErrorPart::Text => text.push_str(&chunk),
                    ErrorPart::Desc => desc.push_str(&chunk),
                    ErrorPart::Hint => hint.push_str(&chunk),
                    ErrorPart::Other => {}
                }
            }
            Ok(Event::End(e)) if in_error => {
                if e.local_name().as_ref() == b"error" {
                    break;
                }
                part = ErrorPart::Text;
            }
            Ok(Event::Eof) | Err(_) => {
                if !in_error {
                    return None;
                }
                break;
            }
            _ => {}
        }
    }

    let message = if desc.is_empty() { text } else { desc };
    if message.is_empty() {
        return None;
    }
    Some(DeviceCloudError::Structured {
        id,
        message,
        hint: (!hint.is_empty()).then_some(hint),
    })
}

fn substring_between<'a>(haystack: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = haystack.find(open)? + open.len();
    let end = haystack[start..].find(close)? + start;
    Some(&haystack[start..end])
}
