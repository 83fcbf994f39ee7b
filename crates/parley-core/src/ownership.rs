//! Per-owner access control for chats and documents.

use crate::chat::Visibility;
use crate::error::{ChatError, ErrorKind, Surface};
use crate::ids::UserId;

/// What the caller wants to do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    Read,
    Write,
}

/// Recorded owner of an existing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOwner {
    pub owner_id: UserId,
    pub visibility: Visibility,
}

impl ResourceOwner {
    /// Owner of a resource that is never shared (documents).
    pub fn private(owner_id: UserId) -> Self {
        Self {
            owner_id,
            visibility: Visibility::Private,
        }
    }
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthorized,
    NotFound,
    Forbidden,
}

impl Denial {
    /// Convert into a request error on the given surface.
    pub fn into_error(self, surface: Surface) -> ChatError {
        let kind = match self {
            Denial::Unauthorized => ErrorKind::Unauthorized,
            Denial::NotFound => ErrorKind::NotFound,
            Denial::Forbidden => ErrorKind::Forbidden,
        };
        ChatError::new(kind, surface)
    }
}

/// Decide whether `caller` may exercise `right` on `resource`.
///
/// Identity is checked before existence so that anonymous callers learn
/// nothing about which resources exist.
pub fn authorize(
    resource: Option<&ResourceOwner>,
    caller: Option<&UserId>,
    right: Right,
) -> Result<(), Denial> {
    let caller = caller.ok_or(Denial::Unauthorized)?;
    let resource = resource.ok_or(Denial::NotFound)?;

    if resource.owner_id == *caller {
        return Ok(());
    }

    match (right, resource.visibility) {
        (Right::Read, Visibility::Public) => Ok(()),
        _ => Err(Denial::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_has_all_rights() {
        let owner = UserId::generate();
        let res = ResourceOwner::private(owner);
        assert_eq!(authorize(Some(&res), Some(&owner), Right::Read), Ok(()));
        assert_eq!(authorize(Some(&res), Some(&owner), Right::Write), Ok(()));
    }

    #[test]
    fn test_anonymous_caller_is_unauthorized_even_for_missing_resource() {
        assert_eq!(authorize(None, None, Right::Read), Err(Denial::Unauthorized));
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let caller = UserId::generate();
        assert_eq!(authorize(None, Some(&caller), Right::Write), Err(Denial::NotFound));
    }

    #[test]
    fn test_public_grants_read_only() {
        let res = ResourceOwner {
            owner_id: UserId::generate(),
            visibility: Visibility::Public,
        };
        let other = UserId::generate();
        assert_eq!(authorize(Some(&res), Some(&other), Right::Read), Ok(()));
        assert_eq!(
            authorize(Some(&res), Some(&other), Right::Write),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn test_private_forbids_other_users() {
        let res = ResourceOwner::private(UserId::generate());
        let other = UserId::generate();
        assert_eq!(
            authorize(Some(&res), Some(&other), Right::Read),
            Err(Denial::Forbidden)
        );
        assert_eq!(
            Denial::Forbidden.into_error(Surface::Document).code(),
            "forbidden:document"
        );
    }
}
