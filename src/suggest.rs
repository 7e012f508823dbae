//! "Did you mean" support for unknown identifiers.

/// Edit distance between two identifiers, computed over a single rolling
/// row with a diagonal carry.
pub fn edit_distance(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    // row[j] holds the distance from the consumed prefix of `a` to b[..j];
    // `diagonal` carries the value the current cell sits above-left of.
    let mut row: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let above = row[j + 1];
            let replace = if ca == cb { diagonal } else { diagonal + 1 };
            row[j + 1] = replace.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }
    row[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any. Candidates are the
/// names in scope at the point of the failed lookup; a pure length gap
/// larger than the budget skips the distance computation outright.
pub fn find_similar<'a, I>(word: &str, candidates: I, max_distance: usize) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let word_len = word.chars().count();
    let mut best: Option<(&str, usize)> = None;

    for candidate in candidates {
        if word_len.abs_diff(candidate.chars().count()) > max_distance {
            continue;
        }
        let dist = edit_distance(word, candidate);
        if dist <= max_distance && best.map(|(_, d)| dist < d).unwrap_or(true) {
            best = Some((candidate, dist));
        }
    }

    best.map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_distance() {
        assert_eq!(edit_distance("counter", "counter"), 0);
    }

    #[test]
    fn single_substitution_costs_one() {
        assert_eq!(edit_distance("delay", "deley"), 1);
    }

    #[test]
    fn insertion_and_deletion_cost_one_each() {
        assert_eq!(edit_distance("pin", "pins"), 1);
        assert_eq!(edit_distance("pins", "pin"), 1);
    }

    #[test]
    fn swapped_neighbors_cost_two() {
        assert_eq!(edit_distance("ab", "ba"), 2);
    }

    #[test]
    fn empty_side_costs_full_length() {
        assert_eq!(edit_distance("", "led"), 3);
        assert_eq!(edit_distance("led", ""), 3);
    }

    #[test]
    fn distance_is_symmetric() {
        assert_eq!(
            edit_distance("semaphore", "samophore"),
            edit_distance("samophore", "semaphore")
        );
    }

    #[test]
    fn finds_closest_declared_name() {
        let names = ["led_pin", "duty", "counter"];
        assert_eq!(
            find_similar("led_pn", names.iter().copied(), 2),
            Some("led_pin")
        );
    }

    #[test]
    fn prefers_the_nearer_of_two_matches() {
        let names = ["count", "counts"];
        assert_eq!(find_similar("countz", names.iter().copied(), 2), Some("count"));
    }

    #[test]
    fn far_words_yield_nothing() {
        let names = ["led_pin", "duty"];
        assert_eq!(find_similar("semaphore", names.iter().copied(), 2), None);
    }

    #[test]
    fn length_gap_beyond_budget_is_skipped() {
        let names = ["a_very_long_identifier"];
        assert_eq!(find_similar("x", names.iter().copied(), 2), None);
    }
}
