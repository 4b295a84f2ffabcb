//! Page range grammar shared by split and rasterization.
//!
//! Input is a comma separated list of 1-based tokens: a single page (`5`), an
//! inclusive span (`1-3`), or an open span (`7-` to the last page, `-3` from the
//! first). Everything returned from here is 0-based. Out-of-range values are
//! clamped into the document or dropped; malformed tokens are skipped.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Page(usize),
    Span(Option<usize>, Option<usize>),
}

fn parse_token(part: &str) -> Option<Token> {
    if let Some((start, end)) = part.split_once('-') {
        let bound = |s: &str| -> Result<Option<usize>, ()> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse().map(Some).map_err(|_| ())
            }
        };
        match (bound(start), bound(end)) {
            (Ok(None), Ok(None)) => None,
            (Ok(a), Ok(b)) => Some(Token::Span(a, b)),
            _ => None,
        }
    } else {
        part.parse().ok().map(Token::Page)
    }
}

fn tokens(spec: &str) -> impl Iterator<Item = Token> + '_ {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let token = parse_token(part);
            if token.is_none() {
                tracing::debug!("Ignoring malformed page range token '{}'", part);
            }
            token
        })
}

/// Resolves one token to ascending 0-based indices within `[0, total_pages)`
fn resolve(token: Token, total_pages: usize) -> Vec<usize> {
    match token {
        Token::Page(page) if (1..=total_pages).contains(&page) => vec![page - 1],
        Token::Page(_) => Vec::new(),
        Token::Span(start, end) => {
            let start = start.unwrap_or(1);
            let end = end.unwrap_or(total_pages);
            let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
            let lo = lo.max(1);
            let hi = hi.min(total_pages);
            if lo > hi {
                Vec::new()
            } else {
                (lo - 1..hi).collect()
            }
        }
    }
}

/// Every page of the document, 0-based
pub fn all_pages(total_pages: usize) -> Vec<usize> {
    (0..total_pages).collect()
}

/// Flattened selection: the ascending, deduplicated union of every token
pub fn parse_page_selection(spec: &str, total_pages: usize) -> Vec<usize> {
    tokens(spec)
        .flat_map(|token| resolve(token, total_pages))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Grouped selection: one ascending group per token, in token order.
///
/// Groups that resolve to nothing are dropped. A group whose pages are all
/// already contained in one earlier group is dropped as well, so `"3,1-2,2"`
/// yields `[[2], [0, 1]]`, while partially overlapping spans such as
/// `"1-3,2-4"` keep both groups.
pub fn parse_page_groups(spec: &str, total_pages: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for token in tokens(spec) {
        let group = resolve(token, total_pages);
        if group.is_empty() {
            continue;
        }
        let covered = groups
            .iter()
            .any(|earlier| group.iter().all(|page| earlier.binary_search(page).is_ok()));
        if !covered {
            groups.push(group);
        }
    }

    groups
}

/// Human readable 1-based label of a group, e.g. `3` or `1-4`
pub fn group_label(group: &[usize]) -> String {
    match (group.first(), group.last()) {
        (Some(first), Some(last)) if first == last => format!("{}", first + 1),
        (Some(first), Some(last)) => format!("{}-{}", first + 1, last + 1),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection_single() {
        assert_eq!(parse_page_selection("5", 10), vec![4]);
    }

    #[test]
    fn test_parse_selection_range() {
        assert_eq!(parse_page_selection("1-3", 10), vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_selection_complex() {
        assert_eq!(
            parse_page_selection("1-3, 5, 8-10", 10),
            vec![0, 1, 2, 4, 7, 8, 9]
        );
    }

    #[test]
    fn test_parse_selection_deduplicates_and_sorts() {
        assert_eq!(parse_page_selection("3,1-2,2", 5), vec![0, 1, 2]);
        assert_eq!(parse_page_selection("1-3, 2-4", 5), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_groups_spec_example() {
        assert_eq!(parse_page_groups("3,1-2,2", 5), vec![vec![2], vec![0, 1]]);
    }

    #[test]
    fn test_parse_groups_keeps_overlapping_spans() {
        assert_eq!(
            parse_page_groups("1-3,2-4", 5),
            vec![vec![0, 1, 2], vec![1, 2, 3]]
        );
    }

    #[test]
    fn test_parse_groups_keeps_token_order() {
        assert_eq!(
            parse_page_groups("5,2,4-3", 5),
            vec![vec![4], vec![1], vec![2, 3]]
        );
    }

    #[test]
    fn test_out_of_range_is_clamped_or_dropped() {
        assert_eq!(parse_page_selection("0,6,99", 5), Vec::<usize>::new());
        assert_eq!(parse_page_selection("4-99", 5), vec![3, 4]);
        assert_eq!(parse_page_selection("0-2", 5), vec![0, 1]);
        assert_eq!(parse_page_groups("7-9,2", 5), vec![vec![1]]);
    }

    #[test]
    fn test_open_spans() {
        assert_eq!(parse_page_selection("4-", 5), vec![3, 4]);
        assert_eq!(parse_page_selection("-2", 5), vec![0, 1]);
        assert_eq!(parse_page_selection("-", 5), Vec::<usize>::new());
    }

    #[test]
    fn test_malformed_tokens_are_skipped() {
        assert_eq!(parse_page_selection("a, 2, 3-b, ,1", 5), vec![0, 1]);
        assert!(parse_page_groups("", 5).is_empty());
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_page_selection("1-3", 0).is_empty());
        assert!(parse_page_groups("1", 0).is_empty());
    }

    #[test]
    fn test_group_label() {
        assert_eq!(group_label(&[2]), "3");
        assert_eq!(group_label(&[0, 1, 2, 3]), "1-4");
        assert_eq!(group_label(&[]), "");
    }
}
