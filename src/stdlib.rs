//! Embedded standard library sources (§6.4). Each library is ordinary
//! program text written in the language itself, embedded at build time and
//! resolved by name inside [`crate::engine::Engine::import`] before relative
//! and absolute filesystem resolution are attempted — there is nothing
//! special about a "standard" library beyond where its source bytes come
//! from.

/// Looks up a standard library by the name passed to `import(name)`.
/// Returns `None` for anything not in the embedded table, in which case the
/// caller falls back to resolving `name` as a file path.
pub fn lookup(name: &str) -> Option<&'static str> {
    match name {
        "std" => Some(include_str!("lib/std.glint")),
        "math" => Some(include_str!("lib/math.glint")),
        "str" => Some(include_str!("lib/str.glint")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_libraries_resolve() {
        assert!(lookup("std").is_some());
        assert!(lookup("math").is_some());
        assert!(lookup("str").is_some());
    }

    #[test]
    fn unknown_library_resolves_to_none() {
        assert!(lookup("nope").is_none());
    }
}
