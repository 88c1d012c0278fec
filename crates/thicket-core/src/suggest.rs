//! Spelling suggestions for unresolved addresses.

use strsim::levenshtein;

/// Find the closest variant to a mistyped value.
pub fn did_you_mean<'a>(value: &str, variants: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    if value.is_empty() {
        return None;
    }

    // "a" should not suggest "cd"
    let max_dist = if value.len() <= 2 { 1 } else { 2 };

    variants
        .into_iter()
        .filter(|v| *v != value)
        .map(|v| (v, levenshtein(value, v)))
        .filter(|(_, dist)| *dist <= max_dist)
        .min_by_key(|(v, dist)| (*dist, *v))
        .map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::did_you_mean;

    #[test]
    fn suggests_close_names() {
        assert_eq!(Some("strutil"), did_you_mean("strutl", vec!["strutil", "dirutil"]));
        assert_eq!(Some("guava"), did_you_mean("gauva", vec!["guava"]));
    }

    #[test]
    fn ignores_distant_names() {
        assert_eq!(None, did_you_mean("completely", vec!["different"]));
        assert_eq!(None, did_you_mean("a", vec!["cd"]));
        assert_eq!(None, did_you_mean("", vec!["a"]));
    }

    #[test]
    fn prefers_closest_then_alphabetical() {
        assert_eq!(Some("abc"), did_you_mean("abx", vec!["abcd", "abc"]));
        assert_eq!(Some("aby"), did_you_mean("abx", vec!["abz", "aby"]));
    }
}
