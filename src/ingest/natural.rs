// Natural ordering for arc and episode names
//
// Leading digit runs compare numerically. A name with a leading number sorts
// before one without. Everything else falls back to natord's numeric-aware,
// case-insensitive comparison.

use std::cmp::Ordering;

/// Leading run of ASCII digits, if any.
pub fn leading_digits(name: &str) -> Option<&str> {
    let end = name
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    if end == 0 {
        None
    } else {
        Some(&name[..end])
    }
}

/// Numeric comparison of two digit strings of any length.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (leading_digits(a), leading_digits(b)) {
        (Some(x), Some(y)) => compare_digit_runs(x, y).then_with(|| fallback_cmp(a, b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => fallback_cmp(a, b),
    }
}

fn fallback_cmp(a: &str, b: &str) -> Ordering {
    natord::compare_ignore_case(a, b).then_with(|| natord::compare(a, b))
}

/// Sort names in place by natural order.
pub fn sort_natural(names: &mut [String]) {
    names.sort_by(|a, b| natural_cmp(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(input: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        sort_natural(&mut v);
        v
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(sorted(&["10.mp4", "2.mp4", "1.mp4"]), vec!["1.mp4", "2.mp4", "10.mp4"]);
    }

    #[test]
    fn test_leading_number_wins_over_suffix() {
        assert_eq!(natural_cmp("2-foo.mp4", "10-bar.mp4"), Ordering::Less);
        assert_eq!(natural_cmp("10-aaa.mp4", "2-zzz.mp4"), Ordering::Greater);
    }

    #[test]
    fn test_numbered_before_unnumbered() {
        assert_eq!(
            sorted(&["Bonus.mp4", "3 Finale.mp4", "Alpha.mp4", "1 Pilot.mp4"]),
            vec!["1 Pilot.mp4", "3 Finale.mp4", "Alpha.mp4", "Bonus.mp4"]
        );
    }

    #[test]
    fn test_alpha_names_are_numeric_aware_and_case_insensitive() {
        assert_eq!(
            sorted(&["Part 10.mkv", "part 2.mkv", "Part 1.mkv"]),
            vec!["Part 1.mkv", "part 2.mkv", "Part 10.mkv"]
        );
    }

    #[test]
    fn test_zero_padding_and_huge_numbers() {
        assert_eq!(compare_digit_runs("007", "7"), Ordering::Equal);
        assert_eq!(
            natural_cmp("99999999999999999999999.mp4", "100000000000000000000000.mp4"),
            Ordering::Less
        );
    }

    #[test]
    fn test_leading_digits() {
        assert_eq!(leading_digits("01 - Intro.mp4"), Some("01"));
        assert_eq!(leading_digits("Intro 01.mp4"), None);
        assert_eq!(leading_digits(""), None);
    }
}
