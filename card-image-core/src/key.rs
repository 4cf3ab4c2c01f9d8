//! Image cache keys
//!
//! Every image request is identified by a structured [`CardKey`]. Its string form is
//!
//! ```text
//! <name>#<setCode>#<cardType>#<collectorId>#<tokenSetCode>#<tokenDescriptor>
//! ```
//!
//! with the optional `#thumb`, `#size=<param>` and `#usesVariousArt` markers placed
//! after the token set code. Markers are stripped before the six core fields are split,
//! so they can appear in any order without breaking the core grammar.

use crate::card::CardView;
use crate::error::ImageCacheError;
use std::fmt;

pub const VARIOUS_ART_MARKER: &str = "#usesVariousArt";
pub const THUMBNAIL_MARKER: &str = "#thumb";
pub const SIZE_MARKER: &str = "#size=";

const SEPARATOR: char = '#';
const CORE_FIELDS: usize = 6;
const TOKEN_COLLECTOR_ID: &str = "0";

/// What kind of image a caller wants for a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRequest {
    Original,
    Thumbnail,
    /// Requested display width in pixels
    Width(u32),
    /// Free-form mode tag such as "Tapped" or "Cropped"
    Mode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CardKey {
    pub name: String,
    pub set_code: String,
    pub card_type: i32,
    /// Normalized collector id, "0" for tokens
    pub collector_id: String,
    pub token_set_code: String,
    pub token_descriptor: String,
    pub uses_various_art: bool,
    pub thumbnail: bool,
    pub size_param: Option<String>,
}

impl CardKey {
    /// Build the key for `card`, using `name` so that the alternate face can be requested too.
    pub fn for_card(card: &CardView, name: &str, request: &ImageRequest) -> CardKey {
        let (thumbnail, size_param) = match request {
            ImageRequest::Original => (false, None),
            ImageRequest::Thumbnail => (true, None),
            ImageRequest::Width(width) => (false, Some(width.to_string())),
            ImageRequest::Mode(mode) => (false, Some(mode.clone())),
        };

        CardKey {
            name: name.to_string(),
            set_code: card.expansion_set_code.clone(),
            card_type: card.card_type,
            collector_id: normalize_collector_id(&card.card_number),
            token_set_code: card.token_set_code.clone().unwrap_or_default(),
            token_descriptor: card.token_descriptor.clone().unwrap_or_default(),
            uses_various_art: card.uses_various_art,
            thumbnail,
            size_param,
        }
    }

    /// Parse a key string.
    ///
    /// Fails with [`ImageCacheError::MalformedKey`] when the string, once the modifier
    /// markers are removed, does not split into six fields or the card type is not an
    /// integer. The last field takes the remainder of the string, so a token descriptor
    /// may itself contain `#`.
    pub fn parse(raw: &str) -> Result<CardKey, ImageCacheError> {
        let mut core = raw.to_string();
        let uses_various_art = strip_marker(&mut core, VARIOUS_ART_MARKER);
        let thumbnail = strip_marker(&mut core, THUMBNAIL_MARKER);
        let size_param = strip_size_marker(&mut core);

        let fields: Vec<&str> = core.splitn(CORE_FIELDS, SEPARATOR).collect();
        if fields.len() != CORE_FIELDS {
            return Err(ImageCacheError::MalformedKey(raw.to_string()));
        }

        let card_type = fields[2]
            .trim()
            .parse::<i32>()
            .map_err(|_| ImageCacheError::MalformedKey(raw.to_string()))?;

        Ok(CardKey {
            name: fields[0].to_string(),
            set_code: fields[1].to_string(),
            card_type,
            collector_id: normalize_collector_id(fields[3]),
            token_set_code: fields[4].to_string(),
            token_descriptor: fields[5].to_string(),
            uses_various_art,
            thumbnail,
            size_param,
        })
    }

    /// Tokens, emblems and other objects without a collector number
    pub fn is_token(&self) -> bool {
        self.collector_id == TOKEN_COLLECTOR_ID
    }

    /// The same card with the request modifiers cleared
    pub fn original(&self) -> CardKey {
        CardKey {
            thumbnail: false,
            size_param: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}#{}#{}#{}",
            self.name, self.set_code, self.card_type, self.collector_id, self.token_set_code
        )?;
        if self.thumbnail {
            f.write_str(THUMBNAIL_MARKER)?;
        }
        if let Some(size) = &self.size_param {
            write!(f, "{}{}", SIZE_MARKER, size)?;
        }
        if self.uses_various_art {
            f.write_str(VARIOUS_ART_MARKER)?;
        }
        write!(f, "#{}", self.token_descriptor)
    }
}

fn normalize_collector_id(raw: &str) -> String {
    if raw.is_empty() || raw == "null" {
        TOKEN_COLLECTOR_ID.to_string()
    } else {
        raw.to_string()
    }
}

/// Byte offset of `marker` where it is followed by a separator or the end of the key.
fn marker_position(key: &str, marker: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = key[from..].find(marker) {
        let start = from + offset;
        let end = start + marker.len();
        if end == key.len() || key[end..].starts_with(SEPARATOR) {
            return Some(start);
        }
        // markers start with '#', so start + 1 is a char boundary
        from = start + 1;
    }
    None
}

fn strip_marker(key: &mut String, marker: &str) -> bool {
    match marker_position(key, marker) {
        Some(start) => {
            key.replace_range(start..start + marker.len(), "");
            true
        }
        None => false,
    }
}

/// Byte range of the first `#size=<param>` marker with a non-empty parameter. The
/// parameter runs to the next separator or the end of the key.
fn size_marker_span(key: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = key[from..].find(SIZE_MARKER) {
        let start = from + offset;
        let value_start = start + SIZE_MARKER.len();
        let value_end = key[value_start..]
            .find(SEPARATOR)
            .map_or(key.len(), |i| value_start + i);
        if value_end > value_start {
            return Some((start, value_end));
        }
        from = start + 1;
    }
    None
}

fn strip_size_marker(key: &mut String) -> Option<String> {
    let (start, end) = size_marker_span(key)?;
    let value = key[start + SIZE_MARKER.len()..end].to_string();
    key.replace_range(start..end, "");
    Some(value)
}
