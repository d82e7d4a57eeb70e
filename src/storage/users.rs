use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use crate::errors::SplitError;
use crate::models::User;
use crate::storage::collection::JsonCollection;

pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

pub struct UserStore {
    collection: JsonCollection<User>,
}

impl UserStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            collection: JsonCollection::open(data_dir, "users.json").await?,
        })
    }

    /// Create an account. Emails are unique (case-insensitive); a duplicate
    /// is a conflict, checked inside the collection's critical section.
    pub async fn create(&self, new: NewUser) -> Result<User> {
        self.collection
            .update(move |users| {
                let email_lower = new.email.to_lowercase();
                if users.iter().any(|u| u.email.to_lowercase() == email_lower) {
                    return Err(SplitError::Conflict(format!(
                        "email '{}' is already registered",
                        new.email
                    )));
                }
                let user = User {
                    id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
                    first_name: new.first_name,
                    last_name: new.last_name,
                    email: new.email,
                    password_hash: new.password_hash,
                    is_admin: new.is_admin,
                    created_at: Utc::now(),
                };
                users.push(user.clone());
                Ok(user)
            })
            .await?
            .map_err(Into::into)
    }

    pub async fn get(&self, id: i64) -> Option<User> {
        self.collection
            .read(|users| users.iter().find(|u| u.id == id).cloned())
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        let email_lower = email.to_lowercase();
        self.collection
            .read(|users| {
                users
                    .iter()
                    .find(|u| u.email.to_lowercase() == email_lower)
                    .cloned()
            })
            .await
    }

    pub async fn list_all(&self) -> Vec<User> {
        self.collection.read(|users| users.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_new(email: &str) -> NewUser {
        NewUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            is_admin: false,
        }
    }

    async fn setup() -> (UserStore, TempDir) {
        let tmp = TempDir::new().expect("create temp dir");
        let store = UserStore::open(tmp.path()).await.expect("open store");
        (store, tmp)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, _tmp) = setup().await;
        let user = store
            .create(make_new("ada@example.com"))
            .await
            .expect("create");
        assert_eq!(user.id, 1);

        let fetched = store.get(user.id).await.expect("found");
        assert_eq!(fetched.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let (store, _tmp) = setup().await;
        store
            .create(make_new("ada@example.com"))
            .await
            .expect("create first");
        let result = store.create(make_new("ADA@example.com")).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("already registered"));
    }

    #[tokio::test]
    async fn test_find_by_email_case_insensitive() {
        let (store, _tmp) = setup().await;
        store
            .create(make_new("Ada@Example.com"))
            .await
            .expect("create");
        let found = store.find_by_email("ada@example.com").await;
        assert!(found.is_some());
        assert!(store.find_by_email("nobody@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let tmp = TempDir::new().expect("create temp dir");
        {
            let store = UserStore::open(tmp.path()).await.expect("open");
            store
                .create(make_new("ada@example.com"))
                .await
                .expect("create");
        }
        let store = UserStore::open(tmp.path()).await.expect("reopen");
        assert_eq!(store.list_all().await.len(), 1);
    }
}
