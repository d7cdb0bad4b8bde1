//! Single-pass token scanner.
//!
//! Tokens are written `{name}` or `{name:argument}` and may contain one
//! nested token in their argument (`{listid:{parameter:ListTitle}}`).  A few
//! aliases are introduced by `~` instead (`~site`); those have no closing
//! delimiter and are only ever matched against the registry's irregular
//! alias list.
//!
//! All positions handed out by this module sit on ASCII delimiter bytes, so
//! slicing the input at them never splits a UTF-8 sequence.

/// Opening delimiter of a structural token.
pub const OPEN: u8 = b'{';
/// Closing delimiter of a structural token.
pub const CLOSE: u8 = b'}';
/// Marker introducing an undelimited alias (`~site`).
pub const TILDE: u8 = b'~';

/// Maximum bracket depth of a structural token: the token itself plus one
/// nested level.
const MAX_DEPTH: usize = 2;

/// Returns `true` if `input` contains any byte that may start a token.
#[must_use]
pub fn has_marker(input: &str) -> bool {
    input.bytes().any(is_marker)
}

/// Returns `true` if `byte` may start a token.
#[must_use]
pub const fn is_marker(byte: u8) -> bool {
    byte == OPEN || byte == TILDE
}

/// Find the end (exclusive) of the balanced token opening at `start`.
///
/// Returns `None` when `start` is not an opening brace, when the braces are
/// not closed, or when nesting exceeds one level.  In those cases the opening
/// brace is plain text and scanning resumes at the next byte.
#[must_use]
pub fn token_end(input: &str, start: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(start) != Some(&OPEN) {
        return None;
    }
    let mut depth = 0usize;
    for (offset, &b) in bytes.get(start..)?.iter().enumerate() {
        match b {
            OPEN => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return None;
                }
            }
            CLOSE => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns `true` if `alias` is exactly one structural token, i.e. the
/// scanner would bound it on its own.  Other aliases (`~site`, `{x}extra`)
/// have to be matched by prefix.
#[must_use]
pub fn is_structural(alias: &str) -> bool {
    token_end(alias, 0) == Some(alias.len())
}

/// Returns `true` if `candidate` is a braced literal identifier rather than
/// a token name, e.g. `{3f2504e0-4f89-11d3-9a0c-0305e82c3301}`.
///
/// Such runs are never resolvable, so the engine neither looks them up nor
/// reports them as leftovers.
#[must_use]
pub fn is_guid_literal(candidate: &str) -> bool {
    let Some(inner) = candidate
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return false;
    };
    is_guid(inner)
}

/// Returns `true` if `text` has the 8-4-4-4-12 hexadecimal GUID shape.
#[must_use]
pub fn is_guid(text: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let mut groups = text.split('-');
    for expected in GROUPS {
        match groups.next() {
            Some(group) if group.len() == expected => {
                if !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    groups.next().is_none()
}
