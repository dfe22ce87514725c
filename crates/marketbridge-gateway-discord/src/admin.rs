//! Who may change routing from inside Discord.

/// Configured admin policy. Checks run in order: role ids, role names,
/// then the Administrator permission.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    pub role_ids: Vec<u64>,
    /// Matched exactly, ignoring case. Earlier names take precedence.
    pub role_names: Vec<String>,
    pub allow_administrator: bool,
}

/// What a member brings to the check.
#[derive(Debug, Clone, Default)]
pub struct MemberAuthority {
    pub role_ids: Vec<u64>,
    pub role_names: Vec<String>,
    pub administrator: bool,
}

/// Why a member was allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminGrant {
    RoleId(u64),
    RoleName(String),
    Administrator,
}

impl AdminPolicy {
    /// Whether resolving role names is needed to decide for these role ids.
    pub fn needs_role_names(&self, member_role_ids: &[u64]) -> bool {
        !self.role_names.is_empty() && self.grant_by_id(member_role_ids).is_none()
    }

    pub fn check(&self, member: &MemberAuthority) -> Option<AdminGrant> {
        if let Some(id) = self.grant_by_id(&member.role_ids) {
            return Some(AdminGrant::RoleId(id));
        }
        for wanted in &self.role_names {
            if member
                .role_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(wanted))
            {
                return Some(AdminGrant::RoleName(wanted.clone()));
            }
        }
        if self.allow_administrator && member.administrator {
            return Some(AdminGrant::Administrator);
        }
        None
    }

    fn grant_by_id(&self, member_role_ids: &[u64]) -> Option<u64> {
        self.role_ids
            .iter()
            .copied()
            .find(|id| member_role_ids.contains(id))
    }
}
