//! Local-fallback user list.
//!
//! Used only when the remote authentication service is unreachable and the
//! local-auth fallback is enabled in configuration. Passwords are stored as
//! salted BLAKE3 hashes.

use carelink_shared::types::User;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use crate::database::Store;
use crate::error::Result;
use crate::models::LocalUser;

const PASSWORD_KDF_CONTEXT: &str = "carelink-password-v1";

/// Salted password hash, hex-encoded.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut material = Vec::with_capacity(salt.len() + password.len());
    material.extend_from_slice(salt.as_bytes());
    material.extend_from_slice(password.as_bytes());
    hex::encode(blake3::derive_key(PASSWORD_KDF_CONTEXT, &material))
}

/// Fresh random salt, hex-encoded.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Store {
    /// Insert or replace a local user record.
    pub fn upsert_local_user(&self, user: &User, password: &str) -> Result<()> {
        let salt = generate_salt();
        let record = LocalUser {
            user: user.clone(),
            password_hash: hash_password(password, &salt),
            salt,
        };
        self.conn().execute(
            "INSERT INTO local_users (username, user_json, password_hash, salt)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (username) DO UPDATE SET
                 user_json = excluded.user_json,
                 password_hash = excluded.password_hash,
                 salt = excluded.salt",
            params![
                user.username,
                serde_json::to_string(&record.user)?,
                record.password_hash,
                record.salt,
            ],
        )?;
        Ok(())
    }

    /// Look up a local user by username.
    pub fn find_local_user(&self, username: &str) -> Result<Option<LocalUser>> {
        let row = self
            .conn()
            .query_row(
                "SELECT user_json, password_hash, salt FROM local_users WHERE username = ?1",
                params![username],
                |row| {
                    let user_json: String = row.get(0)?;
                    let password_hash: String = row.get(1)?;
                    let salt: String = row.get(2)?;
                    Ok((user_json, password_hash, salt))
                },
            )
            .optional()?;

        match row {
            Some((user_json, password_hash, salt)) => Ok(Some(LocalUser {
                user: serde_json::from_str(&user_json)?,
                password_hash,
                salt,
            })),
            None => Ok(None),
        }
    }

    /// Verify a username/password pair against the local list.
    pub fn verify_local_user(&self, username: &str, password: &str) -> Result<Option<User>> {
        match self.find_local_user(username)? {
            Some(record) if hash_password(password, &record.salt) == record.password_hash => {
                Ok(Some(record.user))
            }
            _ => Ok(None),
        }
    }

    /// All local users, without password material.
    pub fn list_local_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_json FROM local_users ORDER BY username")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(serde_json::from_str(&row?)?);
        }
        Ok(users)
    }

    /// Remove a local user. Returns `true` if a row was deleted.
    pub fn delete_local_user(&self, username: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM local_users WHERE username = ?1",
            params![username],
        )?;
        Ok(affected > 0)
    }
}
