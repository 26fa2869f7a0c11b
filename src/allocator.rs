//! Group partitioning for one election round.
//!
//! The on-chain contract assigns each registered member an ordinal index and
//! derives their discussion group from it. Room membership on the chat side
//! must match the contract's assignment exactly, so the arithmetic here is a
//! careful integer-for-integer copy of the contract's rule, not a
//! reformulation of it.

/// The derived shape of one round's partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupLayout {
    /// Size of the larger groups.
    pub group_max_size: usize,
    /// Number of groups of size `group_min_size`.
    pub num_short_groups: usize,
    /// Number of groups of size `group_max_size`.
    pub num_large_groups: usize,
    /// Size of the smaller groups.
    pub group_min_size: usize,
}

impl GroupLayout {
    /// Members that fall into the large groups, which come first.
    pub fn members_in_large_groups(&self) -> usize {
        (self.group_min_size + 1) * self.num_large_groups
    }
}

/// Compute the partition shape for `num_participants` members split into
/// `num_groups` groups.
///
/// # Panics
/// Panics if `num_groups` is zero or the population is empty. The caller
/// validates the round configuration before getting here; partitioning
/// nothing, or into nothing, is a programmer error, not an input error.
pub fn layout(num_participants: usize, num_groups: usize) -> GroupLayout {
    assert!(num_groups >= 1, "group count must be at least 1");
    assert!(num_participants >= 1, "cannot partition an empty population");

    // Ceiling division, as the contract does it.
    let group_max_size = (num_participants + num_groups - 1) / num_groups;
    let num_short_groups = group_max_size * num_groups - num_participants;
    GroupLayout {
        group_max_size,
        num_short_groups,
        num_large_groups: num_groups - num_short_groups,
        group_min_size: group_max_size - 1,
    }
}

/// The sizes of all groups, large groups first.
pub fn allocate(num_participants: usize, num_groups: usize) -> Vec<usize> {
    let layout = layout(num_participants, num_groups);
    let mut sizes = vec![layout.group_max_size; layout.num_large_groups];
    sizes.extend(vec![layout.group_min_size; layout.num_short_groups]);
    sizes
}

/// Map a member's ordinal index to their group index.
///
/// # Panics
/// Panics if `index >= num_participants` or `num_groups` is zero.
pub fn member_index_to_group(index: usize, num_participants: usize, num_groups: usize) -> usize {
    assert!(
        index < num_participants,
        "member index {index} out of range for {num_participants} participants"
    );

    let layout = layout(num_participants, num_groups);
    let large_members = layout.members_in_large_groups();
    if index < large_members {
        index / (layout.group_min_size + 1)
    } else {
        layout.num_large_groups + (index - large_members) / layout.group_min_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_layout_86_by_20() {
        let layout = layout(86, 20);
        assert_eq!(layout.group_max_size, 5);
        assert_eq!(layout.num_short_groups, 14);
        assert_eq!(layout.num_large_groups, 6);
        assert_eq!(layout.group_min_size, 4);
    }

    #[test]
    fn example_mapping_86_by_20() {
        for index in 0..5 {
            assert_eq!(member_index_to_group(index, 86, 20), 0);
        }
        for index in 5..10 {
            assert_eq!(member_index_to_group(index, 86, 20), 1);
        }
        // Last member of the last large group.
        assert_eq!(member_index_to_group(29, 86, 20), 5);
        // First member of the first short group.
        assert_eq!(member_index_to_group(30, 86, 20), 6);
        // Last member overall.
        assert_eq!(member_index_to_group(85, 86, 20), 19);
    }

    #[test]
    fn sizes_sum_to_population() {
        for num_participants in 1..200 {
            for num_groups in 1..=num_participants.min(40) {
                let layout = layout(num_participants, num_groups);
                let sizes = allocate(num_participants, num_groups);
                assert_eq!(sizes.len(), num_groups);
                assert_eq!(sizes.iter().sum::<usize>(), num_participants);
                for size in sizes {
                    assert!(size == layout.group_min_size || size == layout.group_max_size);
                }
            }
        }
    }

    #[test]
    fn every_index_lands_in_exactly_one_group() {
        for (num_participants, num_groups) in [(1, 1), (12, 3), (86, 20), (100, 7), (41, 41)] {
            let sizes = allocate(num_participants, num_groups);
            let mut seen = vec![0usize; num_groups];
            for index in 0..num_participants {
                let group = member_index_to_group(index, num_participants, num_groups);
                assert!(group < num_groups);
                seen[group] += 1;
            }
            assert_eq!(seen, sizes);
        }
    }

    #[test]
    fn mapping_is_stable() {
        for index in 0..86 {
            let first = member_index_to_group(index, 86, 20);
            let second = member_index_to_group(index, 86, 20);
            assert_eq!(first, second);
        }
    }

    #[test]
    #[should_panic]
    fn zero_groups_is_a_programmer_error() {
        layout(5, 0);
    }

    #[test]
    #[should_panic]
    fn empty_population_is_a_programmer_error() {
        layout(0, 3);
    }

    #[test]
    #[should_panic]
    fn out_of_range_index_is_a_programmer_error() {
        member_index_to_group(86, 86, 20);
    }
}
