//! Prefix/delimiter grouping over a flat key namespace.
//!
//! Backends that cannot group server-side (or only with a fixed delimiter)
//! list flat and group here.

use std::collections::BTreeSet;

use crate::provider::{Listing, StoredObject};

/// Group objects by prefix and delimiter.
///
/// Objects whose key does not start with `prefix` are dropped. With a
/// non-empty delimiter, a key containing the delimiter after the prefix is
/// replaced by the common prefix ending at its first occurrence. Object order
/// is preserved; common prefixes come out sorted and unique.
pub fn group_by_delimiter<I>(objects: I, prefix: Option<&str>, delimiter: Option<&str>) -> Listing
where
    I: IntoIterator<Item = StoredObject>,
{
    let prefix = prefix.unwrap_or("");
    let delimiter = delimiter.filter(|d| !d.is_empty());

    let mut listing = Listing::default();
    let mut prefixes = BTreeSet::new();

    for object in objects {
        let Some(rest) = object.key.strip_prefix(prefix) else {
            continue;
        };

        match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
            Some(end) => {
                prefixes.insert(object.key[..prefix.len() + end].to_string());
            }
            None => listing.objects.push(object),
        }
    }

    listing.common_prefixes = prefixes.into_iter().collect();
    listing
}
