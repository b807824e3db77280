//! Priorities for lifecycle phases, listeners and middleware.
//!
//! Lower numbers run first. Equal priorities keep their registration order,
//! so every sort in Orbit goes through [`sort_by_priority`], which is stable.

/// Ordering key. Lower runs earlier.
pub type Priority = u32;

/// Priority used when a satellite, listener or middleware does not set one.
pub const DEFAULT_PRIORITY: Priority = 100;

/// Stable sort by ascending priority.
///
/// Items with equal priority stay in the order they were supplied.
pub fn sort_by_priority<T, F>(items: &mut [T], priority: F)
where
    F: Fn(&T) -> Priority,
{
    items.sort_by_key(|item| priority(item));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sorts_ascending_and_keeps_ties_in_order() {
        let mut items = vec![("c", 10), ("a", 5), ("d", 10), ("b", 5), ("e", 1)];
        sort_by_priority(&mut items, |(_, p)| *p);
        let names: Vec<&str> = items.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["e", "a", "b", "c", "d"]);
    }
}
