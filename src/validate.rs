//! Normalization and validation of the guest's contact form.
//!
//! Everything here is pure: no I/O, no clock. A request that fails any check
//! is rejected before the store is touched.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 20;
pub const MAX_MAC_LEN: usize = 30;
pub const MAX_USERNAME_LEN: usize = 50;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .unwrap()
});

// Six colon/hyphen separated octets, or three dot separated 16-bit groups.
static MAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}$|^(?:[0-9A-Fa-f]{4}\.){2}[0-9A-Fa-f]{4}$")
        .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("All fields are required")]
    MissingField,
    #[error("Invalid data: one or more fields exceed the allowed length")]
    FieldTooLong,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Invalid phone number")]
    InvalidPhone,
    #[error("Invalid MAC address")]
    InvalidMac,
}

/// A validated hardware address in canonical form: lower-case hex octets
/// joined by colons. Both accepted input layouts (`AA-BB-..`, `aabb.ccdd.eeff`)
/// and any casing map to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if !MAC_RE.is_match(input) {
            return Err(ValidationError::InvalidMac);
        }
        let hex: Vec<char> = input
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let octets: Vec<String> = hex.chunks(2).map(|pair| pair.iter().collect()).collect();
        Ok(Self(octets.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.0
    }
}

/// Request body as submitted. Fields are loosely typed so a phone sent as a
/// JSON number is treated the same as its string form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAccessRequest {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub phone: Option<Value>,
    #[serde(default)]
    pub mac: Option<Value>,
    #[serde(default)]
    pub username: Option<Value>,
}

/// Contact snapshot and device identity after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    /// HTML-escaped display name
    pub name: String,
    /// Lower-cased email
    pub email: String,
    /// Digits only, 10 or 11 long
    pub phone: String,
    pub mac: MacAddress,
    /// Present only when the named-login policy asked for it
    pub username: Option<String>,
}

fn field_text(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn too_long(value: &str, max: usize) -> bool {
    value.chars().count() > max
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Strips everything but ASCII digits; the result must be 10 or 11 long.
pub fn normalize_phone(phone: &str) -> Result<String, ValidationError> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 | 11 => Ok(digits),
        _ => Err(ValidationError::InvalidPhone),
    }
}

/// Escapes markup-significant characters before the name is persisted.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(c),
        }
    }
    out
}

/// Validates and normalizes a raw request.
///
/// `require_username` is set by the named-login policy; otherwise any
/// submitted username is ignored.
pub fn normalize(
    raw: &RawAccessRequest,
    require_username: bool,
) -> Result<AccessRequest, ValidationError> {
    let name = field_text(&raw.name);
    let email = field_text(&raw.email);
    let phone = field_text(&raw.phone);
    let mac = field_text(&raw.mac);
    let username = field_text(&raw.username);

    if name.is_empty()
        || email.is_empty()
        || phone.is_empty()
        || mac.is_empty()
        || (require_username && username.is_empty())
    {
        return Err(ValidationError::MissingField);
    }

    if too_long(&name, MAX_NAME_LEN)
        || too_long(&email, MAX_EMAIL_LEN)
        || too_long(&phone, MAX_PHONE_LEN)
        || too_long(&mac, MAX_MAC_LEN)
        || (require_username && too_long(&username, MAX_USERNAME_LEN))
    {
        return Err(ValidationError::FieldTooLong);
    }

    if !is_valid_email(&email) {
        return Err(ValidationError::InvalidEmail);
    }

    let phone = normalize_phone(&phone)?;
    let mac = MacAddress::parse(&mac)?;

    Ok(AccessRequest {
        name: escape_html(&name),
        email: email.to_lowercase(),
        phone,
        mac,
        username: require_username.then_some(username),
    })
}
