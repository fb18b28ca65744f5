// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

/// the configuration of a target machine
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TargetProperties {
    /// the number of lanes in a subgroup
    pub subgroup_size: u32,
    /// `true` if the target implements 64-bit and float atomics natively,
    /// so compare-exchange retry loops are never emitted for them
    pub has_native_wide_atomics: bool,
}

impl Default for TargetProperties {
    fn default() -> Self {
        TargetProperties {
            subgroup_size: 16,
            has_native_wide_atomics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_properties() {
        let target_properties = TargetProperties::default();
        assert_eq!(target_properties.subgroup_size, 16);
        assert!(!target_properties.has_native_wide_atomics);
    }
}
