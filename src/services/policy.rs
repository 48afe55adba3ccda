//! Role-based authorization.
//!
//! A pure decision function: callers check it before touching the store and
//! return a denial without side effects when it says no.

use crate::domain::{Action, Actor, Resource};

#[must_use]
pub fn authorize(actor: &Actor, action: Action, resource: Resource) -> bool {
    if actor.role.is_admin() {
        return true;
    }

    match (resource, action) {
        (Resource::Category, Action::Read) => true,
        (Resource::Category, _) => false,

        (Resource::Incident { .. }, Action::Read | Action::Create) => true,
        (Resource::Incident { creator_id }, Action::Update) => creator_id == Some(actor.id),
        (Resource::Incident { .. }, Action::Delete) => false,

        // Audit history, dashboard, metrics and role management are admin tools
        (Resource::AuditLog | Resource::Dashboard | Resource::Metrics | Resource::Account, _) => {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    const ADMIN: Actor = Actor::new(1, Role::Admin);
    const OWNER: Actor = Actor::new(2, Role::Regular);
    const OTHER: Actor = Actor::new(3, Role::Regular);

    #[test]
    fn test_category_rules() {
        for action in [Action::Create, Action::Update, Action::Delete] {
            assert!(authorize(&ADMIN, action, Resource::Category));
            assert!(!authorize(&OWNER, action, Resource::Category));
        }
        assert!(authorize(&OWNER, Action::Read, Resource::Category));
    }

    #[test]
    fn test_incident_rules() {
        let owned = Resource::Incident {
            creator_id: Some(OWNER.id),
        };

        let cases = [
            (OWNER, Action::Read, true),
            (OWNER, Action::Create, true),
            (OWNER, Action::Update, true),
            (OWNER, Action::Delete, false),
            (OTHER, Action::Read, true),
            (OTHER, Action::Update, false),
            (OTHER, Action::Delete, false),
            (ADMIN, Action::Update, true),
            (ADMIN, Action::Delete, true),
        ];

        for (actor, action, expected) in cases {
            assert_eq!(
                authorize(&actor, action, owned),
                expected,
                "{actor:?} {action:?}"
            );
        }

        let orphan = Resource::Incident { creator_id: None };
        assert!(!authorize(&OWNER, Action::Update, orphan));
    }

    #[test]
    fn test_admin_tools() {
        for resource in [
            Resource::AuditLog,
            Resource::Dashboard,
            Resource::Metrics,
            Resource::Account,
        ] {
            assert!(authorize(&ADMIN, Action::Read, resource));
            assert!(!authorize(&OWNER, Action::Read, resource));
            assert!(!authorize(&OWNER, Action::Update, resource));
        }
    }
}
