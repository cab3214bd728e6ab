//! Role-based permission checks.
//!
//! Admins hold every permission implicitly. Other roles are granted from a
//! fixed allow-list; an unknown permission string is simply not granted.

use carelink_shared::types::Role;

pub const CHANNEL_CREATE: &str = "channel.create";
pub const CHANNEL_UPDATE: &str = "channel.update";
pub const CHANNEL_DELETE: &str = "channel.delete";
pub const MESSAGE_SEND: &str = "message.send";
pub const USER_MANAGE: &str = "user.manage";

const MODERATOR_PERMISSIONS: &[&str] =
    &[CHANNEL_CREATE, CHANNEL_UPDATE, CHANNEL_DELETE, MESSAGE_SEND];

const USER_PERMISSIONS: &[&str] = &[MESSAGE_SEND];

pub fn role_has_permission(role: Role, permission: &str) -> bool {
    match role {
        Role::Admin => true,
        Role::Moderator => MODERATOR_PERMISSIONS.contains(&permission),
        Role::User => USER_PERMISSIONS.contains(&permission),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_everything() {
        assert!(role_has_permission(Role::Admin, CHANNEL_DELETE));
        assert!(role_has_permission(Role::Admin, USER_MANAGE));
        assert!(role_has_permission(Role::Admin, "anything.else"));
    }

    #[test]
    fn test_moderator_manages_channels_not_users() {
        assert!(role_has_permission(Role::Moderator, CHANNEL_CREATE));
        assert!(role_has_permission(Role::Moderator, CHANNEL_DELETE));
        assert!(role_has_permission(Role::Moderator, MESSAGE_SEND));
        assert!(!role_has_permission(Role::Moderator, USER_MANAGE));
    }

    #[test]
    fn test_user_can_only_send() {
        assert!(role_has_permission(Role::User, MESSAGE_SEND));
        assert!(!role_has_permission(Role::User, CHANNEL_CREATE));
        assert!(!role_has_permission(Role::User, USER_MANAGE));
    }

    #[test]
    fn test_unknown_permission_not_granted() {
        assert!(!role_has_permission(Role::User, "made.up"));
        assert!(!role_has_permission(Role::Moderator, "made.up"));
    }
}
