//! Persistence of the authenticated session (token + user) so it can be
//! restored across restarts.

use carelink_shared::types::User;

use crate::database::Store;
use crate::error::Result;

const KEY_TOKEN: &str = "auth.token";
const KEY_USER: &str = "auth.user";

impl Store {
    /// Persist the current session.
    pub fn save_session(&self, token: &str, user: &User) -> Result<()> {
        self.kv_set(KEY_TOKEN, token)?;
        self.kv_set(KEY_USER, &serde_json::to_string(user)?)?;
        Ok(())
    }

    /// Load the persisted session, if both token and user are present.
    pub fn load_session(&self) -> Result<Option<(String, User)>> {
        let token = match self.kv_get(KEY_TOKEN)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let user_json = match self.kv_get(KEY_USER)? {
            Some(u) => u,
            None => return Ok(None),
        };
        let user: User = serde_json::from_str(&user_json)?;
        Ok(Some((token, user)))
    }

    /// Remove the persisted session.
    pub fn clear_session(&self) -> Result<()> {
        self.kv_delete(KEY_TOKEN)?;
        self.kv_delete(KEY_USER)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_shared::types::Role;

    fn sample_user() -> User {
        User {
            id: "u-1".into(),
            username: "iris".into(),
            display_name: "Iris Ward".into(),
            role: Role::User,
        }
    }

    #[test]
    fn test_session_round_trip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_session().unwrap().is_none());

        let user = sample_user();
        store.save_session("tok-123", &user).unwrap();

        let (token, restored) = store.load_session().unwrap().unwrap();
        assert_eq!(token, "tok-123");
        assert_eq!(restored, user);

        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }

    #[test]
    fn test_token_without_user_is_not_a_session() {
        let store = Store::open_in_memory().unwrap();
        store.kv_set("auth.token", "orphan").unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
