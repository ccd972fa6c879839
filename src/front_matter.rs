//! YAML front matter extraction.
//!
//! A document may open with a `---` fenced YAML block; its mapping becomes
//! the highest-precedence local config overrides and feeds `{{ param }}`
//! substitution. Malformed front matter degrades to an empty mapping with a
//! warning, never an error.

use serde_yml::Mapping;
use tracing::warn;

/// A document split into front matter and body.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub front_matter: Mapping,
    pub body: String,
}

/// Split a leading `---` YAML fence from `source`.
///
/// The opening fence must be the first line; the block ends at the next
/// `---` (or `...`) line. Without a fence the whole input is body.
#[must_use]
pub fn split(source: &str) -> Document {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let Some(rest) = strip_fence_line(source) else {
        return Document { front_matter: Mapping::new(), body: source.to_string() };
    };

    let mut yaml_len = None;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            yaml_len = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }

    let Some((yaml_end, body_start)) = yaml_len else {
        // Unterminated fence: not front matter at all.
        return Document { front_matter: Mapping::new(), body: source.to_string() };
    };

    let yaml = &rest[..yaml_end];
    let body = rest[body_start..].to_string();

    let front_matter = match serde_yml::from_str::<Mapping>(yaml) {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!("Malformed front matter ignored: {e}");
            Mapping::new()
        }
    };

    Document { front_matter, body }
}

/// Consume an opening `---` line, returning the remainder.
fn strip_fence_line(source: &str) -> Option<&str> {
    let rest = source.strip_prefix("---")?;
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest.strip_prefix('\n')
}
