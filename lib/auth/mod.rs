use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Staff-surface roles. Absence of a role means unauthenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Admin,
}

/// Authorization collaborator seam: maps an opaque credential to a role.
pub trait RoleResolver: Send + Sync {
    fn resolve_role(&self, credential: Option<&str>) -> Option<Role>;
}

struct Session {
    role: Role,
    expires_at: DateTime<Utc>,
}

/// PIN-based login issuing opaque bearer tokens with a TTL.
///
/// The staff PIN is required; the admin PIN is optional (small shops run
/// with a single shared PIN). Sessions live in memory: restarting the
/// process logs everyone out, which matches the physical setting.
pub struct PinSessions {
    staff_pin: String,
    admin_pin: Option<String>,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl PinSessions {
    pub fn new(staff_pin: String, admin_pin: Option<String>, ttl: Duration) -> Self {
        Self {
            staff_pin,
            admin_pin,
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Exchanges a PIN for a session token. Admin PIN is checked first so a
    /// shop configured with identical PINs still gets the stronger role.
    pub fn login(&self, pin: &str) -> Option<(String, Role)> {
        let role = if self.admin_pin.as_deref() == Some(pin) {
            Role::Admin
        } else if self.staff_pin == pin {
            Role::Staff
        } else {
            return None;
        };

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + self.ttl;
        self.sessions
            .write()
            .expect("session lock poisoned")
            .insert(token.clone(), Session { role, expires_at });
        Some((token, role))
    }

    pub fn logout(&self, token: &str) {
        self.sessions
            .write()
            .expect("session lock poisoned")
            .remove(token);
    }

    /// Drops every expired session. Called opportunistically from resolve.
    fn prune(&self, now: DateTime<Utc>) {
        self.sessions
            .write()
            .expect("session lock poisoned")
            .retain(|_, session| session.expires_at > now);
    }
}

impl RoleResolver for PinSessions {
    fn resolve_role(&self, credential: Option<&str>) -> Option<Role> {
        let token = credential?;
        let now = Utc::now();
        self.prune(now);
        self.sessions
            .read()
            .expect("session lock poisoned")
            .get(token)
            .map(|session| session.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> PinSessions {
        PinSessions::new(
            "1234".to_string(),
            Some("9999".to_string()),
            Duration::hours(12),
        )
    }

    #[test]
    fn staff_pin_yields_a_resolvable_staff_session() {
        let auth = sessions();
        let (token, role) = auth.login("1234").expect("staff pin should log in");
        assert_eq!(role, Role::Staff);
        assert_eq!(auth.resolve_role(Some(&token)), Some(Role::Staff));
    }

    #[test]
    fn admin_pin_outranks_staff_pin() {
        let auth = sessions();
        let (_, role) = auth.login("9999").expect("admin pin should log in");
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn wrong_pin_and_unknown_token_resolve_to_nothing() {
        let auth = sessions();
        assert!(auth.login("0000").is_none());
        assert_eq!(auth.resolve_role(Some("not-a-token")), None);
        assert_eq!(auth.resolve_role(None), None);
    }

    #[test]
    fn logout_invalidates_the_token() {
        let auth = sessions();
        let (token, _) = auth.login("1234").expect("login should succeed");
        auth.logout(&token);
        assert_eq!(auth.resolve_role(Some(&token)), None);
    }

    #[test]
    fn expired_sessions_are_pruned() {
        let auth = PinSessions::new("1234".to_string(), None, Duration::zero());
        let (token, _) = auth.login("1234").expect("login should succeed");
        assert_eq!(
            auth.resolve_role(Some(&token)),
            None,
            "zero-ttl session must be expired on first resolve"
        );
    }
}
