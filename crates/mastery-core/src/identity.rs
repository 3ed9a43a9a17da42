//! Login identity normalization.

use crate::error::ValidationError;
use crate::model::StudentId;

/// Blocks used when the configuration does not list any.
pub const DEFAULT_BLOCKS: &[&str] = &["First", "Second", "Fourth"];

/// Normalize raw login fields into a [`StudentId`].
///
/// Names and block are trimmed, inner whitespace is collapsed, and each
/// word is title-cased, so `"  ada  LOVELACE "` and `"Ada Lovelace"` are
/// the same student. When `allowed_blocks` is non-empty the block must
/// match one of them case-insensitively.
pub fn normalize(
    first_name: &str,
    last_name: &str,
    block: &str,
    allowed_blocks: &[String],
) -> Result<StudentId, ValidationError> {
    let first_name = title_case(first_name);
    let last_name = title_case(last_name);
    let block = title_case(block);

    if first_name.is_empty() {
        return Err(ValidationError::MissingField("first name"));
    }
    if last_name.is_empty() {
        return Err(ValidationError::MissingField("last name"));
    }
    if block.is_empty() {
        return Err(ValidationError::MissingField("block"));
    }

    let block = if allowed_blocks.is_empty() {
        block
    } else {
        allowed_blocks
            .iter()
            .find(|b| b.eq_ignore_ascii_case(&block))
            .cloned()
            .ok_or_else(|| ValidationError::UnknownBlock {
                given: block.clone(),
                allowed: allowed_blocks.to_vec(),
            })?
    };

    Ok(StudentId {
        first_name,
        last_name,
        block,
    })
}

/// Title-case a name: a letter is upper-cased when it does not follow
/// another letter ("o'neil-smith" becomes "O'Neil-Smith").
pub fn title_case(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    let mut prev_is_letter = false;
    for c in collapsed.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}
