use crate::{allowlist::AllowlistSnapshot, domain::Identity};

/// A chat member whose username is not on the allow-list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub identity: Identity,
}

/// Compare a chat's members against the allow-list.
///
/// Members without a username are never flagged: the allow-list is keyed by
/// username and there is nothing to match them on. Output keeps input order,
/// including duplicates.
pub fn diff(members: &[Identity], allowlist: &AllowlistSnapshot) -> Vec<Violation> {
    members
        .iter()
        .filter(|m| match &m.username {
            Some(u) => !allowlist.contains(u),
            None => false,
        })
        .map(|m| Violation {
            identity: m.clone(),
        })
        .collect()
}
