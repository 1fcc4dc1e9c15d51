//! Connection identity — a random id plus a display color derived from it.

use serde::Serialize;
use uuid::Uuid;

/// Server-assigned identity of one connection. Immutable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub color: String,
}

/// Assign a fresh identity. 122 random bits; no coordination needed.
pub fn assign() -> Identity {
    let id = Uuid::new_v4();
    Identity {
        color: color_for(&id.to_string()),
        id,
    }
}

/// Derive `#rrggbb` from the first six UTF-16 code units of `id`,
/// each reduced to one hex digit (`unit % 16`).
///
/// Small output space: different ids may share a color.
pub fn color_for(id: &str) -> String {
    let digits: String = id
        .encode_utf16()
        .take(6)
        .map(|unit| char::from_digit(u32::from(unit % 16), 16).unwrap_or('0'))
        .collect();
    format!("#{digits}")
}
