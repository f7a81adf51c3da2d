//! Search filter rendering
//!
//! Turns a [`SearchFilter`] into RFC 4515 filter text. Configured filters
//! are taken verbatim; values coming from local data are always escaped.

use adsync_core::domain::ObjectGuid;
use adsync_core::ports::SearchFilter;

/// Renders `filter` as LDAP filter text
pub fn render(filter: &SearchFilter) -> String {
    match filter {
        SearchFilter::Raw(raw) => {
            let raw = raw.trim();
            if raw.starts_with('(') {
                raw.to_string()
            } else {
                format!("({raw})")
            }
        }
        SearchFilter::ObjectGuid(guid) => format!("(objectGUID={})", escape_guid(guid)),
        SearchFilter::AccountName(name) => format!("(sAMAccountName={})", escape_value(name)),
        SearchFilter::And(parts) => match parts.as_slice() {
            [] => "(objectClass=*)".to_string(),
            [only] => render(only),
            parts => {
                let inner: String = parts.iter().map(render).collect();
                format!("(&{inner})")
            }
        },
    }
}

/// Escapes an assertion value (RFC 4515 section 3)
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            other => out.push(other),
        }
    }
    out
}

/// Encodes a GUID as the escaped byte string `objectGUID` filters need
pub fn escape_guid(guid: &ObjectGuid) -> String {
    guid.to_bytes()
        .iter()
        .map(|byte| format!("\\{byte:02x}"))
        .collect()
}
