//! URL normalization for user-submitted links.
//!
//! Users paste all kinds of things into a "summarize this page" box: bare domains,
//! percent-encoded links copied out of another URL's path, links that lost one of
//! their scheme slashes on the way. [`normalize_url`] turns that text into a
//! canonical absolute `http`/`https` URL or rejects it.
//!
//! The pipeline is, in order:
//!
//! 1. trim surrounding whitespace (empty input is rejected)
//! 2. best-effort percent-decoding
//! 3. repair of a collapsed scheme separator (`https:/host` -> `https://host`)
//! 4. `https://` is prepended when no `scheme://` prefix is present
//! 5. strict validation
//!
//! Running the normalizer on its own output is a no-op.

use crate::domain::host::BlockReason;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Scheme inserted in front of inputs that carry none.
pub const DEFAULT_SCHEME: &str = "https";

/// Longest URL accepted, in bytes.
pub const MAX_URL_LENGTH: usize = 2084;

/// Reasons a URL is refused at the perimeter.
///
/// Every variant renders a message that is safe to show to the user who
/// submitted the URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing left after trimming.
    #[error("URL is empty")]
    Empty,
    /// The candidate exceeds [`MAX_URL_LENGTH`].
    #[error("URL is longer than {max} characters")]
    TooLong { max: usize },
    /// Whitespace or control characters inside the URL.
    #[error("URL must not contain spaces or control characters")]
    Whitespace,
    /// A scheme other than http or https.
    #[error("URL scheme `{scheme}` is not supported, use http or https")]
    UnsupportedScheme { scheme: String },
    /// `//host/...` with no scheme of its own.
    #[error("URL must include a host right after the scheme")]
    ProtocolRelative,
    /// Userinfo such as `user:pass@` in the authority.
    #[error("URL must not contain credentials")]
    Credentials,
    /// No host in the authority.
    #[error("URL has no host")]
    MissingHost,
    /// Any other syntax error reported by the parser.
    #[error("URL is malformed: {reason}")]
    Malformed { reason: String },
    /// The host is refused by the SSRF guard.
    #[error("URL host `{host}` is not allowed ({reason})")]
    BlockedHost { host: String, reason: BlockReason },
    /// The host name did not resolve to any address.
    #[error("URL host `{host}` could not be resolved")]
    Unresolvable { host: String },
}

impl ValidationError {
    /// Whether this rejection came from the SSRF guard rather than from syntax.
    pub fn is_blocked_host(&self) -> bool {
        matches!(self, ValidationError::BlockedHost { .. })
    }
}

/// An absolute `http`/`https` URL produced by [`normalize_url`].
///
/// The string form is exactly the normalizer's output; the parsed form is kept
/// alongside so the host can be handed to the SSRF guard without re-parsing.
/// Equality and hashing use the string form.
#[derive(Debug, Clone)]
pub struct NormalizedUrl {
    raw: String,
    parsed: Url,
}

impl NormalizedUrl {
    /// The normalized URL text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Canonical host as serialized by the URL parser.
    ///
    /// IPv6 literals keep their brackets, IPv4 literals are in dotted-quad form
    /// and internationalized names are punycode.
    pub fn host(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    /// Lowercase scheme, either `http` or `https`.
    pub fn scheme(&self) -> &str {
        self.parsed.scheme()
    }

    /// The parsed URL.
    pub fn as_url(&self) -> &Url {
        &self.parsed
    }

    /// Consume and return the normalized text.
    pub fn into_string(self) -> String {
        self.raw
    }
}

impl PartialEq for NormalizedUrl {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for NormalizedUrl {}

impl Hash for NormalizedUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl FromStr for NormalizedUrl {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_url(s)
    }
}

/// Normalize free-form user input into an absolute `http`/`https` URL.
///
/// # Errors
/// Returns a [`ValidationError`] describing why the input cannot be made into a
/// valid absolute URL. Host blocking is not applied here; see
/// [`HostGuard`](crate::domain::host::HostGuard).
///
/// # Example
/// ```
/// use fetch_perimeter::normalize_url;
///
/// let url = normalize_url("example.com/article").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/article");
///
/// let repaired = normalize_url("https:/example.com/a").unwrap();
/// assert_eq!(repaired.as_str(), "https://example.com/a");
/// ```
pub fn normalize_url(input: &str) -> Result<NormalizedUrl, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    // Decoding is a convenience: a string that cannot be decoded is used as-is.
    let decoded = percent_decode_lenient(trimmed).unwrap_or_else(|| trimmed.to_owned());
    let repaired = repair_collapsed_scheme(decoded);

    let candidate = if has_scheme_separator(&repaired) {
        repaired
    } else {
        format!("{DEFAULT_SCHEME}://{repaired}")
    };

    let parsed = validate(&candidate)?;
    Ok(NormalizedUrl {
        raw: candidate,
        parsed,
    })
}

/// Decode `%XX` escapes, leaving encoded the ones that would yield `%`,
/// whitespace or control characters (Unicode ones included).
///
/// Multibyte characters are decoded as a unit. Returns `None` when the input
/// holds a malformed escape or an escaped sequence that is not valid UTF-8.
/// Since `%` is never produced, decoding the output again changes nothing.
fn percent_decode_lenient(input: &str) -> Option<String> {
    if !input.contains('%') {
        return Some(input.to_owned());
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let width = utf8_width(escaped_byte(bytes, i)?)?;
        let end = i + 3 * width;
        let mut encoded = [0u8; 4];
        for (k, byte) in encoded[..width].iter_mut().enumerate() {
            *byte = escaped_byte(bytes, i + 3 * k)?;
        }
        let decoded = std::str::from_utf8(&encoded[..width]).ok()?;

        if decoded.chars().any(stays_encoded) {
            out.extend_from_slice(&bytes[i..end]);
        } else {
            out.extend_from_slice(decoded.as_bytes());
        }
        i = end;
    }

    String::from_utf8(out).ok()
}

/// The byte encoded by the `%XX` escape starting at `at`.
fn escaped_byte(bytes: &[u8], at: usize) -> Option<u8> {
    if bytes.get(at) != Some(&b'%') {
        return None;
    }
    let hi = bytes.get(at + 1).copied().and_then(hex_value)?;
    let lo = bytes.get(at + 2).copied().and_then(hex_value)?;
    Some((hi << 4) | lo)
}

/// Length of the UTF-8 sequence introduced by `lead`.
fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7f => Some(1),
        0xc2..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf4 => Some(4),
        _ => None,
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|digit| digit as u8)
}

fn stays_encoded(c: char) -> bool {
    c == '%' || c.is_whitespace() || c.is_control()
}

/// Split `scheme:rest` when the prefix is a syntactically valid scheme.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;

    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn is_web_scheme(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// Rewrite `http:/host` and `https:/host` to use two slashes.
fn repair_collapsed_scheme(input: String) -> String {
    let repaired = match split_scheme(&input) {
        Some((scheme, rest))
            if is_web_scheme(scheme) && rest.starts_with('/') && !rest.starts_with("//") =>
        {
            Some(format!("{scheme}:/{rest}"))
        }
        _ => None,
    };
    repaired.unwrap_or(input)
}

fn has_scheme_separator(input: &str) -> bool {
    split_scheme(input).is_some_and(|(_, rest)| rest.starts_with("//"))
}

fn validate(candidate: &str) -> Result<Url, ValidationError> {
    if candidate.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_URL_LENGTH,
        });
    }

    if candidate
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ValidationError::Whitespace);
    }

    let (scheme, rest) = split_scheme(candidate).ok_or_else(|| ValidationError::Malformed {
        reason: "missing scheme".to_string(),
    })?;

    if !is_web_scheme(scheme) {
        return Err(ValidationError::UnsupportedScheme {
            scheme: scheme.to_ascii_lowercase(),
        });
    }

    // The parser would silently skip extra slashes, turning `https:////host`
    // into a valid URL.
    let authority = rest.strip_prefix("//").unwrap_or(rest);
    if authority.starts_with('/') || authority.starts_with('\\') {
        return Err(ValidationError::ProtocolRelative);
    }

    let parsed = Url::parse(candidate).map_err(|err| match err {
        url::ParseError::EmptyHost => ValidationError::MissingHost,
        other => ValidationError::Malformed {
            reason: other.to_string(),
        },
    })?;

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(ValidationError::Credentials);
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(ValidationError::MissingHost),
    }
}
