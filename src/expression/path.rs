//! Dotted/indexed path navigation over JSON values.
//!
//! `items[0].name`, `items.0.name` and `["items"][0]["name"]` all address the
//! same value. Traversal stops at the first hop that is missing or null and
//! reports "unresolved" rather than an error.

use serde_json::Value;

/// Split a path into segments.
///
/// `items[0].x` gives `items`, `0`, `x`. A quoted bracket key (`a["b.c"]`)
/// is one segment even when it contains dots. Empty segments are dropped.
pub fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                flush(&mut segments, &mut current);
                let quote = match chars.peek() {
                    Some(&q) if q == '"' || q == '\'' => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut segment = String::new();
                for inner in chars.by_ref() {
                    match quote {
                        Some(q) if inner == q => continue,
                        _ if inner == ']' => break,
                        _ => segment.push(inner),
                    }
                }
                if quote.is_none() {
                    segment = segment.trim().to_string();
                }
                if !segment.is_empty() {
                    segments.push(segment);
                }
            }
            '.' => flush(&mut segments, &mut current),
            _ => current.push(c),
        }
    }
    flush(&mut segments, &mut current);
    segments
}

fn flush(segments: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        segments.push(std::mem::take(current));
    }
}

/// Rewrite bracket segments into dotted segments.
///
/// `items[0].x` becomes `items.0.x`; quoted keys (`a["b c"]`) become `a.b c`.
/// For display only: a quoted key containing a dot does not survive the
/// round trip, so traversal goes through [`path_segments`].
pub fn normalize_path(path: &str) -> String {
    path_segments(path).join(".")
}

/// Walk `path` starting at `root`.
///
/// An empty path returns the root itself. Returns `None` as soon as a hop is
/// absent, null, out of range, or a scalar. A null *final* value is returned
/// as `Some(Value::Null)`.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path_segments(path) {
        current = step(current, &segment)?;
    }
    Some(current)
}

fn step<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => match segment {
            "length" => None,
            _ => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        },
        // Null and scalars end traversal
        _ => None,
    }
}

/// Like [`get_path`] but owned, with `length` on arrays and strings.
///
/// The reference grammar allows `$json.items.length`, which is common in
/// templates even though it is not a stored key.
pub fn lookup(root: &Value, path: &str) -> Option<Value> {
    lookup_segments(root, &path_segments(path))
}

/// [`lookup`] over already split segments.
pub fn lookup_segments(root: &Value, segments: &[String]) -> Option<Value> {
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        if segment == "length" && i + 1 == segments.len() {
            match current {
                Value::Array(items) => return Some(Value::from(items.len())),
                Value::String(s) => return Some(Value::from(s.chars().count())),
                _ => {}
            }
        }
        current = step(current, segment)?;
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_array_indices() {
        assert_eq!(normalize_path("items[0].x"), "items.0.x");
        assert_eq!(normalize_path("posts[0].id"), "posts.0.id");
        assert_eq!(normalize_path("a[1][2]"), "a.1.2");
        assert_eq!(normalize_path(".a.b"), "a.b");
    }

    #[test]
    fn test_normalize_quoted_keys() {
        assert_eq!(normalize_path("a[\"b c\"].d"), "a.b c.d");
        assert_eq!(normalize_path("['x']"), "x");
    }

    #[test]
    fn test_quoted_keys_keep_dots() {
        assert_eq!(path_segments("a[\"b.c\"].d"), vec!["a", "b.c", "d"]);
        let data = json!({"a.b": 1, "x": {"y.z": [true]}});
        assert_eq!(get_path(&data, "[\"a.b\"]"), Some(&json!(1)));
        assert_eq!(lookup(&data, "x['y.z'][0]"), Some(json!(true)));
        assert_eq!(get_path(&data, "a.b"), None);
    }

    #[test]
    fn test_get_path_nested() {
        let data = json!({"user": {"tags": ["a", "b"], "profile": {"age": 30}}});
        assert_eq!(get_path(&data, "user.profile.age"), Some(&json!(30)));
        assert_eq!(get_path(&data, "user.tags[1]"), Some(&json!("b")));
        assert_eq!(get_path(&data, ""), Some(&data));
    }

    #[test]
    fn test_get_path_short_circuits() {
        let data = json!({"a": null, "b": 5, "list": [1]});
        assert_eq!(get_path(&data, "a.x"), None);
        assert_eq!(get_path(&data, "b.x"), None);
        assert_eq!(get_path(&data, "list.3"), None);
        assert_eq!(get_path(&data, "missing.deep.path"), None);
    }

    #[test]
    fn test_get_path_final_null_is_resolved() {
        let data = json!({"a": null});
        assert_eq!(get_path(&data, "a"), Some(&Value::Null));
    }

    #[test]
    fn test_lookup_length() {
        let data = json!({"items": [1, 2, 3], "name": "héllo"});
        assert_eq!(lookup(&data, "items.length"), Some(json!(3)));
        assert_eq!(lookup(&data, "name.length"), Some(json!(5)));
        assert_eq!(lookup(&data, "items[2]"), Some(json!(3)));
    }
}
