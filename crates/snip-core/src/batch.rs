//! Conflict detection shared by every batch insert.
//!
//! Items are examined in order and, for each item, the URL is checked before
//! the code. The first hit wins.

use crate::error::StoreError;
use crate::shortcode::ShortCode;
use crate::store::LinkPair;
use std::collections::HashMap;
use std::collections::HashSet;

/// Finds the first conflict of a batch, both within the batch itself and
/// against already stored live records.
///
/// * `live_code_for_url` - returns the user's live code for a URL, if any
/// * `code_is_live` - tells whether the user already has a live record with a code
pub fn first_conflict<U, C>(
    batch: &[LinkPair],
    mut live_code_for_url: U,
    mut code_is_live: C,
) -> Option<StoreError>
where
    U: FnMut(&str) -> Option<ShortCode>,
    C: FnMut(&ShortCode) -> bool,
{
    let mut seen_urls: HashMap<&str, &ShortCode> = HashMap::with_capacity(batch.len());
    let mut seen_codes: HashSet<&ShortCode> = HashSet::with_capacity(batch.len());

    for item in batch {
        if let Some(existing) = live_code_for_url(&item.original_url) {
            return Some(StoreError::NotUnique {
                short_url: existing,
                original_url: item.original_url.clone(),
            });
        }
        if let Some(first) = seen_urls.get(item.original_url.as_str()) {
            return Some(StoreError::NotUnique {
                short_url: (*first).clone(),
                original_url: item.original_url.clone(),
            });
        }
        if code_is_live(&item.short_url) || seen_codes.contains(&item.short_url) {
            return Some(StoreError::DuplicateCode(item.short_url.clone()));
        }

        seen_urls.insert(item.original_url.as_str(), &item.short_url);
        seen_codes.insert(&item.short_url);
    }

    None
}

/// Checks a batch for repeated URLs or codes, ignoring stored records.
pub fn check_batch(batch: &[LinkPair]) -> Result<(), StoreError> {
    match first_conflict(batch, |_| None, |_| false) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(code: &str, url: &str) -> LinkPair {
        LinkPair::new(ShortCode::new_unchecked(code), url)
    }

    #[test]
    fn clean_batch_passes() {
        let batch = vec![
            pair("aaaaaa", "https://one.example/"),
            pair("bbbbbb", "https://two.example/"),
        ];
        assert!(check_batch(&batch).is_ok());
        assert!(check_batch(&[]).is_ok());
    }

    #[test]
    fn repeated_url_reports_first_code() {
        let batch = vec![
            pair("aaaaaa", "https://one.example/"),
            pair("bbbbbb", "https://one.example/"),
        ];
        let err = check_batch(&batch).unwrap_err();
        match err {
            StoreError::NotUnique {
                short_url,
                original_url,
            } => {
                assert_eq!(short_url.as_str(), "aaaaaa");
                assert_eq!(original_url, "https://one.example/");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn repeated_code_is_duplicate() {
        let batch = vec![
            pair("aaaaaa", "https://one.example/"),
            pair("aaaaaa", "https://two.example/"),
        ];
        assert!(matches!(
            check_batch(&batch),
            Err(StoreError::DuplicateCode(code)) if code.as_str() == "aaaaaa"
        ));
    }

    #[test]
    fn stored_url_wins_over_stored_code() {
        let batch = vec![
            pair("aaaaaa", "https://one.example/"),
            pair("taken0", "https://stored.example/"),
        ];
        let err = first_conflict(
            &batch,
            |url| (url == "https://stored.example/").then(|| ShortCode::new_unchecked("old000")),
            |code| code.as_str() == "taken0",
        )
        .unwrap();
        assert!(
            matches!(err, StoreError::NotUnique { ref short_url, .. } if short_url.as_str() == "old000")
        );
    }

    #[test]
    fn stored_code_is_duplicate() {
        let batch = vec![pair("taken0", "https://fresh.example/")];
        let err = first_conflict(&batch, |_| None, |code| code.as_str() == "taken0").unwrap();
        assert!(matches!(err, StoreError::DuplicateCode(_)));
    }
}
