use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Opaque capability set carried by a group member and required by a command.
///
/// Gateways translate their own role/flag model into these bits; the
/// dispatcher only ever asks whether one set [`satisfies`](Self::satisfies)
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(u64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const SEND_MESSAGES: Permissions = Permissions(1 << 0);
    pub const MANAGE_MESSAGES: Permissions = Permissions(1 << 1);
    pub const MODERATE_MEMBERS: Permissions = Permissions(1 << 2);
    pub const MANAGE_GROUP: Permissions = Permissions(1 << 3);
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 4);

    const NAMED: [(Permissions, &'static str); 5] = [
        (Self::SEND_MESSAGES, "Send Messages"),
        (Self::MANAGE_MESSAGES, "Manage Messages"),
        (Self::MODERATE_MEMBERS, "Moderate Members"),
        (Self::MANAGE_GROUP, "Manage Group"),
        (Self::ADMINISTRATOR, "Administrator"),
    ];

    pub const fn all() -> Self {
        Self(0b1_1111)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when every bit in `required` is present in `self`.
    pub const fn satisfies(self, required: Permissions) -> bool {
        self.contains(required)
    }

    /// Bits of `required` that `self` lacks.
    pub const fn missing(self, required: Permissions) -> Permissions {
        Permissions(required.0 & !self.0)
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies_is_subset_test() {
        let held = Permissions::SEND_MESSAGES | Permissions::MANAGE_GROUP;
        assert!(held.satisfies(Permissions::MANAGE_GROUP));
        assert!(held.satisfies(Permissions::NONE));
        assert!(!held.satisfies(Permissions::MANAGE_GROUP | Permissions::ADMINISTRATOR));
        assert!(!Permissions::NONE.satisfies(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_missing_and_display() {
        let held = Permissions::SEND_MESSAGES;
        let required = Permissions::SEND_MESSAGES | Permissions::MANAGE_GROUP;
        assert_eq!(held.missing(required), Permissions::MANAGE_GROUP);
        assert_eq!(held.missing(required).to_string(), "Manage Group");
        assert_eq!(Permissions::NONE.to_string(), "none");
    }
}
