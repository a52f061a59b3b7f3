//! The audiopath grammar.
//!
//! An audiopath is the canonical string identifying a playable resource:
//!
//! ```text
//! audiopath   := provider ':' type ':' id [ ':' subfield ... ]
//! provider    := 'spotify' | 'spotify@' accountId
//!              | 'tunein' | 'radio' | 'library' | 'applemusic[@user]'
//!              | 'deezer[@user]' | 'tidal[@user]'
//!              | 'musicassistant[@user]' | 'linein' | 'airplay'
//!              | http(s) URL
//! ```
//!
//! Incoming play URIs additionally accept:
//! - percent-encoded forms,
//! - base64-wrapped forms `…b64_<base64>`, decoded recursively (depth ≤ 4),
//! - a `/parentpath/<parent>/<index>[/noshuffle]` suffix conveying queue
//!   context (parent container, explicit start item, start index).

use serde::{Deserialize, Serialize};

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

/// Maximum unwrap depth for nested `b64_` / percent encodings.
const MAX_DECODE_DEPTH: usize = 4;

const PARENTPATH_SEPARATOR: &str = "/parentpath/";
const NOSHUFFLE_TOKEN: &str = "/noshuffle";

/// Content provider extracted from an audiopath prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    Spotify { account: Option<String> },
    TuneIn,
    Radio,
    Library,
    AppleMusic { user: Option<String> },
    Deezer { user: Option<String> },
    Tidal { user: Option<String> },
    MusicAssistant { user: Option<String> },
    LineIn,
    Airplay,
    /// Bare `http(s)://…` URL used directly as an audiopath.
    HttpUrl,
    Unknown(String),
}

impl Provider {
    /// Classifies the provider of an audiopath.
    pub fn classify(audiopath: &str) -> Provider {
        if audiopath.starts_with("http://") || audiopath.starts_with("https://") {
            return Provider::HttpUrl;
        }

        let prefix = match audiopath.split(':').next() {
            Some(p) if !p.is_empty() => p,
            _ => return Provider::Unknown(String::new()),
        };

        let (name, account) = match prefix.split_once('@') {
            Some((name, account)) => (name, Some(account.to_string())),
            None => (prefix, None),
        };

        match name {
            "spotify" => Provider::Spotify { account },
            "tunein" => Provider::TuneIn,
            "radio" => Provider::Radio,
            "library" => Provider::Library,
            "applemusic" => Provider::AppleMusic { user: account },
            "deezer" => Provider::Deezer { user: account },
            "tidal" => Provider::Tidal { user: account },
            "musicassistant" => Provider::MusicAssistant { user: account },
            "linein" => Provider::LineIn,
            "airplay" => Provider::Airplay,
            other => Provider::Unknown(other.to_string()),
        }
    }

    /// The grammar prefix without any account part.
    pub fn prefix(&self) -> &str {
        match self {
            Provider::Spotify { .. } => "spotify",
            Provider::TuneIn => "tunein",
            Provider::Radio => "radio",
            Provider::Library => "library",
            Provider::AppleMusic { .. } => "applemusic",
            Provider::Deezer { .. } => "deezer",
            Provider::Tidal { .. } => "tidal",
            Provider::MusicAssistant { .. } => "musicassistant",
            Provider::LineIn => "linein",
            Provider::Airplay => "airplay",
            Provider::HttpUrl => "http",
            Provider::Unknown(name) => name,
        }
    }

    /// Providers whose content is always a radio-style endless stream.
    pub fn is_radio_provider(&self) -> bool {
        matches!(self, Provider::TuneIn | Provider::Radio)
    }

    /// The remote-queue tag when the provider exposes its own queue.
    ///
    /// Spotify is special-cased by the coordinator: with offload disabled
    /// it downgrades to local authority even though a tag exists here.
    pub fn remote_queue_tag(&self) -> Option<&'static str> {
        match self {
            Provider::Spotify { .. } => Some("spotify"),
            Provider::MusicAssistant { .. } => Some("musicassistant"),
            Provider::AppleMusic { .. } => Some("applemusic"),
            Provider::Deezer { .. } => Some("deezer"),
            Provider::Tidal { .. } => Some("tidal"),
            _ => None,
        }
    }
}

/// Queue context parsed from a `/parentpath/` suffix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParentContext {
    /// The parent container URI the queue should be built from.
    pub parent_uri: String,
    /// Explicit item to start at (the pre-separator prefix of the play URI).
    pub start_item: Option<String>,
    /// Explicit start index within the parent container.
    pub start_index: Option<usize>,
    /// Shuffle suppression requested by the caller.
    pub no_shuffle: bool,
}

/// A fully resolved play URI: the normalized target plus optional parent
/// queue context.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedPlayUri {
    pub target: String,
    pub parent: Option<ParentContext>,
}

fn try_base64_decode(payload: &str) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    let decoded = STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE_NO_PAD.decode(payload))
        .ok()?;
    String::from_utf8(decoded).ok()
}

fn try_percent_decode(raw: &str) -> Option<String> {
    if !raw.contains('%') {
        return None;
    }
    match urlencoding::decode(raw) {
        Ok(decoded) if decoded != raw => Some(decoded.into_owned()),
        _ => None,
    }
}

/// Unwraps percent-encoded and `b64_`-wrapped forms, bounded to
/// [`MAX_DECODE_DEPTH`] rounds so hostile inputs cannot loop.
pub fn decode_wrapped(raw: &str) -> String {
    let mut current = raw.to_string();

    for _ in 0..MAX_DECODE_DEPTH {
        if let Some(decoded) = try_percent_decode(&current) {
            current = decoded;
            continue;
        }

        // A wrapped tail looks like "…b64_<payload>"; the payload always
        // extends to the end of the string.
        if let Some(idx) = current.rfind("b64_") {
            let payload = &current[idx + 4..];
            if let Some(decoded) = try_base64_decode(payload) {
                current = format!("{}{}", &current[..idx], decoded);
                continue;
            }
        }

        break;
    }

    current
}

fn strip_control_tokens(raw: &str) -> (&str, bool) {
    let mut rest = raw;
    let mut no_shuffle = false;

    loop {
        if rest.ends_with(NOSHUFFLE_TOKEN) {
            rest = &rest[..rest.len() - NOSHUFFLE_TOKEN.len()];
            no_shuffle = true;
            continue;
        }
        // Opaque base64 tails appended by some controllers: a final segment
        // that decodes as base64 but carries no audiopath semantics.
        if let Some(idx) = rest.rfind('/') {
            let tail = &rest[idx + 1..];
            if let Some(payload) = tail.strip_prefix("b64_") {
                if try_base64_decode(payload).is_none() {
                    rest = &rest[..idx];
                    continue;
                }
            }
        }
        break;
    }

    (rest, no_shuffle)
}

/// Parses a raw play URI into its normalized target and optional parent
/// queue context.
///
/// Splits on `/parentpath/`: the prefix is the explicit start item; in the
/// suffix, trailing control tokens are stripped, a final numeric segment is
/// the start index, and the remainder is the parent URI.
pub fn parse_play_uri(raw: &str) -> ParsedPlayUri {
    let decoded = decode_wrapped(raw.trim());

    let Some((prefix, suffix)) = decoded.split_once(PARENTPATH_SEPARATOR) else {
        return ParsedPlayUri {
            target: normalize_audiopath(&decoded),
            parent: None,
        };
    };

    let (stripped, no_shuffle) = strip_control_tokens(suffix);

    let (parent_uri, start_index) = match stripped.rfind('/') {
        Some(idx) => {
            let candidate = &stripped[idx + 1..];
            if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit()) {
                (&stripped[..idx], candidate.parse::<usize>().ok())
            } else {
                (stripped, None)
            }
        }
        None => (stripped, None),
    };

    let target = normalize_audiopath(prefix);
    let start_item = if target.is_empty() { None } else { Some(target.clone()) };

    ParsedPlayUri {
        target,
        parent: Some(ParentContext {
            parent_uri: normalize_audiopath(parent_uri),
            start_item,
            start_index,
            no_shuffle,
        }),
    }
}

/// Normalizes an audiopath: unwraps encodings, removes any parent-context
/// suffix and control tokens, trims trailing slashes.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize_audiopath(raw: &str) -> String {
    let decoded = decode_wrapped(raw.trim());

    let base = match decoded.split_once(PARENTPATH_SEPARATOR) {
        Some((prefix, _)) => prefix,
        None => &decoded,
    };

    let (stripped, _) = strip_control_tokens(base);

    let mut result = stripped.to_string();
    // Keep "http://host/" style roots intact; only trim redundant tails.
    while result.len() > 1 && result.ends_with('/') && !result.ends_with("//") {
        result.pop();
    }
    result
}

/// Sanitizes a station label against the audiopath it belongs to.
///
/// The label is dropped when it duplicates the audiopath, starts with a
/// provider prefix, or looks like a bare track id.
pub fn sanitize_station(station: &str, audiopath: &str) -> Option<String> {
    let trimmed = station.trim();
    if trimmed.is_empty() || trimmed == audiopath {
        return None;
    }

    if let Some((prefix, _)) = trimmed.split_once(':') {
        let bare = prefix.split('@').next().unwrap_or(prefix);
        if matches!(
            bare,
            "spotify"
                | "tunein"
                | "radio"
                | "library"
                | "applemusic"
                | "deezer"
                | "tidal"
                | "musicassistant"
                | "linein"
                | "airplay"
                | "http"
                | "https"
        ) {
            return None;
        }
    }

    // Bare track ids: one long run of id characters, no spaces.
    if trimmed.len() >= 16
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }

    Some(trimmed.to_string())
}
