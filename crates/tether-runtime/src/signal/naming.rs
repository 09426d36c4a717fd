//! Handler name → method name

pub use tether_config::NameStyle;

/// Turn a handler name from a UI definition into the method name looked up
/// on callback objects.
///
/// `Segments` drops separators, so it is not injective; `FirstLetter` is.
pub fn normalize(name: &str, style: NameStyle) -> String {
    match style {
        NameStyle::Segments => capitalize_segments(name),
        NameStyle::FirstLetter => capitalize_first(name),
    }
}

fn capitalize_segments(s: &str) -> String {
    s.split(|c| matches!(c, '_' | '-' | ':'))
        .map(capitalize_first)
        .collect()
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
