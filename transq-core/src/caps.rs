//! Caps strings and compatibility checks.
//!
//! A caps string names a media type optionally followed by typed fields, for
//! example `audio/mpeg, mpegversion=(int)4`. Element factories advertise the
//! caps they can produce; the resolver asks whether those intersect with the
//! caps a preset requests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// A parsed caps description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    media_type: String,
    /// Field name -> accepted values. A single value is a one-element set.
    fields: BTreeMap<String, Vec<String>>,
}

impl Caps {
    /// Parses a caps string.
    ///
    /// Type annotations such as `(int)` are dropped; the comparison is done on
    /// the textual value. Value sets are written as `{a, b}`.
    pub fn parse(caps: &str) -> CoreResult<Self> {
        let mut parts = split_top_level(caps).into_iter();
        let media_type = parts
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::InvalidCaps(caps.to_string()))?;

        let mut fields = BTreeMap::new();
        for part in parts {
            let Some((name, value)) = part.split_once('=') else {
                log::debug!("Ignoring malformed caps field '{}' in '{}'", part.trim(), caps);
                continue;
            };
            fields.insert(name.trim().to_ascii_lowercase(), parse_values(value));
        }

        Ok(Self { media_type, fields })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns the accepted values of `field`, if present.
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Two caps intersect when the media types match and every field both
    /// sides constrain shares at least one value.
    pub fn can_intersect(&self, other: &Caps) -> bool {
        if self.media_type != other.media_type {
            return false;
        }
        self.fields.iter().all(|(name, values)| match other.fields.get(name) {
            Some(other_values) => values.iter().any(|v| other_values.contains(v)),
            None => true,
        })
    }
}

impl FromStr for Caps {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Caps::parse(s)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (name, values) in &self.fields {
            if values.len() == 1 {
                write!(f, ", {}={}", name, values[0])?;
            } else {
                write!(f, ", {}={{{}}}", name, values.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Splits on commas that are not inside a `{...}` value set.
fn split_top_level(caps: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in caps.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&caps[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&caps[start..]);
    parts
}

fn parse_values(raw: &str) -> Vec<String> {
    let mut value = raw.trim();
    // Strip a leading type annotation, e.g. "(int)4".
    if value.starts_with('(') {
        if let Some(end) = value.find(')') {
            value = value[end + 1..].trim();
        }
    }

    let value = value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value);

    value
        .split(',')
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
