//! Request-type naming conventions.
//!
//! The studio uses two schemes side by side: dotted names carrying the
//! method as a suffix (`audiomixer.output.muted.set`) and Pascal names
//! carrying it as a prefix (`SetProgramMuted`).

use crate::model::RequestMethod;

const DOT_GET: &str = ".get";
const DOT_SET: &str = ".set";
const PASCAL_GET: &str = "Get";
const PASCAL_SET: &str = "Set";

/// Method implied by a request type, if it follows either scheme.
pub fn method_of(request_type: &str) -> Option<RequestMethod> {
    if request_type.ends_with(DOT_GET) {
        return Some(RequestMethod::Get);
    }
    if request_type.ends_with(DOT_SET) {
        return Some(RequestMethod::Set);
    }
    if has_pascal_prefix(request_type, PASCAL_GET) {
        return Some(RequestMethod::Get);
    }
    if has_pascal_prefix(request_type, PASCAL_SET) {
        return Some(RequestMethod::Set);
    }
    None
}

fn has_pascal_prefix(request_type: &str, prefix: &str) -> bool {
    request_type
        .strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Request type of the same operation with the method swapped to `target`.
///
/// `audiomixer.output.muted.set` pairs with `audiomixer.output.muted.get`,
/// `SetProgramMuted` with `GetProgramMuted`.
pub fn paired_request_type(request_type: &str, target: RequestMethod) -> Option<String> {
    let source = method_of(request_type)?;
    if source == target {
        return Some(request_type.to_string());
    }
    let (from_dot, to_dot, from_pascal, to_pascal) = match target {
        RequestMethod::Get => (DOT_SET, DOT_GET, PASCAL_SET, PASCAL_GET),
        RequestMethod::Set => (DOT_GET, DOT_SET, PASCAL_GET, PASCAL_SET),
    };
    if let Some(base) = request_type.strip_suffix(from_dot) {
        return Some(format!("{base}{to_dot}"));
    }
    request_type
        .strip_prefix(from_pascal)
        .map(|rest| format!("{to_pascal}{rest}"))
}

/// Notification topic the studio publishes when the state changed by a SET
/// request changes.
///
/// Dotted requests notify under their base name (`audiomixer.output.muted`),
/// Pascal requests under the SET request type itself.
pub fn notification_topic(set_request_type: &str) -> String {
    set_request_type
        .strip_suffix(DOT_SET)
        .unwrap_or(set_request_type)
        .to_string()
}

/// Title-case a dotted group name: `audiomixer.output` -> `Audiomixer Output`.
pub fn group_title(name: &str) -> String {
    name.split(['.', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a camelCase id into words: `controllerValue` -> `Controller value`.
pub fn camel_to_words(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 4);
    for (i, c) in id.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            out.push(' ');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    capitalize(&out)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
