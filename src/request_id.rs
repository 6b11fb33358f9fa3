//! Correlation identifiers shared by the prefill and decode calls of one request.
//!
//! The layout `___prefill_addr_{P}___decode_addr_{D}_{R}` is parsed by the
//! backends to find each other for KV cache handoff, so it must stay byte-exact.

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const PREFILL_PREFIX: &str = "___prefill_addr_";
const DECODE_MARKER: &str = "___decode_addr_";
const TOKEN_LEN: usize = 32;

/// Build a fresh correlation identifier from two scheme-less `host:port` addresses.
pub fn encode_request_id(prefill_addr: &str, decode_addr: &str) -> String {
    format!(
        "{}{}{}{}_{}",
        PREFILL_PREFIX,
        prefill_addr,
        DECODE_MARKER,
        decode_addr,
        random_token()
    )
}

/// 128 random bits rendered as 32 lowercase hex characters.
pub fn random_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Drop the `http://` / `https://` prefix and any trailing slash from a URL.
pub fn strip_scheme(url: &str) -> &str {
    url.trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequestId<'a> {
    pub prefill_addr: &'a str,
    pub decode_addr: &'a str,
    pub token: &'a str,
}

/// Split an identifier back into its parts. Returns `None` if it does not follow the layout.
pub fn parse_request_id(request_id: &str) -> Option<ParsedRequestId<'_>> {
    let rest = request_id.strip_prefix(PREFILL_PREFIX)?;
    let marker = rest.find(DECODE_MARKER)?;
    let prefill_addr = &rest[..marker];
    let rest = &rest[marker + DECODE_MARKER.len()..];

    // the token has a fixed width, so split from the right
    if rest.len() < TOKEN_LEN + 1 {
        return None;
    }
    let (decode_part, token) = rest.split_at(rest.len() - TOKEN_LEN);
    let decode_addr = decode_part.strip_suffix('_')?;
    if !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(ParsedRequestId {
        prefill_addr,
        decode_addr,
        token,
    })
}
