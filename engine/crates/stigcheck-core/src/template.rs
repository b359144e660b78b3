//! `{{ name }}` placeholders in probe targets and expected text
//!
//! `{{{{` stands for a literal `{{`, so commands and patterns can still use
//! double braces (e.g. `x{{{{2}}` renders as `x{{2}}`).

const OPEN: &str = "{{";
const ESCAPED_OPEN: &str = "{{{{";

/// Names referenced by placeholders, in order of appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        if rest[start..].starts_with(ESCAPED_OPEN) {
            rest = &rest[start + ESCAPED_OPEN.len()..];
            continue;
        }
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if !name.is_empty() {
                    names.push(name);
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    names
}

/// Replace every placeholder with the string `lookup` returns for its name
pub fn render<E>(
    template: &str,
    mut lookup: impl FnMut(&str) -> Result<String, E>,
) -> Result<String, E> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        if rest[start..].starts_with(ESCAPED_OPEN) {
            out.push_str(&rest[..start]);
            out.push_str(OPEN);
            rest = &rest[start + ESCAPED_OPEN.len()..];
            continue;
        }
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = after[..end].trim();
        if name.is_empty() {
            out.push_str(&rest[start..start + 2 + end + 2]);
        } else {
            out.push_str(&lookup(name)?);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
