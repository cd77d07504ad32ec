//! Choosing hostnames for scale requests.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

const HOSTNAME_PREFIX: &str = "server-";
const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `server-` followed by six random lowercase alphanumerics.
pub fn random_hostname() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("{}{}", HOSTNAME_PREFIX, suffix)
}

/// The requested hostnames, padded with random ones up to `n`.
pub fn hostnames_to_add(requested: &[String], n: usize) -> Vec<String> {
    let mut hostnames = requested.to_vec();
    while hostnames.len() < n {
        hostnames.push(random_hostname());
    }
    hostnames
}

/// The requested hostnames without duplicates, padded up to `n` with current
/// replicas picked at random. Stops early if there is nothing left to pick.
pub fn hostnames_to_remove(requested: &[String], current: &[String], n: usize) -> Vec<String> {
    let mut chosen: Vec<String> = Vec::with_capacity(n);
    let mut seen = BTreeSet::new();
    for hostname in requested {
        if seen.insert(hostname.clone()) {
            chosen.push(hostname.clone());
        }
    }

    let mut candidates: Vec<&String> = current.iter().filter(|h| !seen.contains(*h)).collect();
    candidates.shuffle(&mut rand::thread_rng());
    for hostname in candidates {
        if chosen.len() >= n {
            break;
        }
        chosen.push(hostname.clone());
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_random_hostname_shape() {
        let name = random_hostname();
        let suffix = name.strip_prefix("server-").unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_add_pads_to_n() {
        let names = hostnames_to_add(&hosts(&["a"]), 3);
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], "a");
        assert!(names[1].starts_with("server-"));
    }

    #[test]
    fn test_remove_dedups_and_pads() {
        let current = hosts(&["a", "b", "c", "d"]);
        let chosen = hostnames_to_remove(&hosts(&["a", "a"]), &current, 3);
        assert_eq!(chosen.len(), 3);
        assert_eq!(chosen[0], "a");
        let unique: BTreeSet<_> = chosen.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(chosen[1..].iter().all(|h| current.contains(h)));
    }

    #[test]
    fn test_remove_stops_without_candidates() {
        let chosen = hostnames_to_remove(&hosts(&["x", "y"]), &hosts(&["x"]), 2);
        assert_eq!(chosen, hosts(&["x", "y"]));

        let chosen = hostnames_to_remove(&hosts(&["gone"]), &hosts(&["a"]), 3);
        assert_eq!(chosen.len(), 2);
    }
}
