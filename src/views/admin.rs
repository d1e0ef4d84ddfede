//! Account administration and the orphaned-entry sweep.
//!
//! Deleting an account leaves that person's standup entries behind. An
//! entry is orphaned when its `user_id` matches no local account; the sweep
//! can relink such entries to an account or drop them.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{AuthError, AuthService, generate_password};
use crate::dates::now_iso;
use crate::error::ServiceResult;
use crate::storage::LocalStore;
use crate::types::{AuthUser, SignupData};
use crate::views::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrphanSummary {
    pub user_id: String,
    pub entry_count: usize,
    /// Newest entry date.
    pub latest_entry: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SuggestedAssociation {
    pub orphaned_user_id: String,
    pub user: AuthUser,
}

/// Admin form input for adding a teammate.
#[derive(Clone, Debug, Default)]
pub struct Invite {
    pub email: String,
    pub name: String,
    pub team_id: String,
    /// Generated when blank.
    pub password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InvitedUser {
    pub user: AuthUser,
    pub password: String,
    /// Whether `password` was generated and has to be handed over.
    pub generated: bool,
}

pub struct AdminTools<'a> {
    store: &'a LocalStore,
    auth: &'a AuthService,
}

impl<'a> AdminTools<'a> {
    /// Fails unless the signed-in account holds admin rights.
    pub fn open(store: &'a LocalStore, auth: &'a AuthService) -> Result<Self, AuthError> {
        let admin = auth.require_admin()?;
        info!(username = %admin.username, "admin tools opened");
        Ok(Self::new(store, auth))
    }

    fn new(store: &'a LocalStore, auth: &'a AuthService) -> Self {
        Self { store, auth }
    }

    fn account_ids(&self) -> HashSet<String> {
        self.auth.all_users().into_iter().map(|u| u.id).collect()
    }

    /// One summary per unknown `user_id`, ordered by id.
    pub fn orphaned_data(&self) -> Vec<OrphanSummary> {
        let known = self.account_ids();
        let mut by_user: BTreeMap<String, (usize, String)> = BTreeMap::new();
        for entry in self.store.get_entries() {
            if known.contains(&entry.user_id) {
                continue;
            }
            let slot = by_user.entry(entry.user_id).or_default();
            slot.0 += 1;
            if entry.date > slot.1 {
                slot.1 = entry.date;
            }
        }
        by_user
            .into_iter()
            .map(|(user_id, (entry_count, latest))| OrphanSummary {
                user_id,
                entry_count,
                latest_entry: if latest.is_empty() {
                    "Unknown".to_string()
                } else {
                    latest
                },
            })
            .collect()
    }

    /// Moves every entry of `old_user_id` to `new_user_id`. Returns false
    /// when there was nothing to move.
    pub fn associate_data_with_user(
        &self,
        old_user_id: &str,
        new_user_id: &str,
    ) -> ServiceResult<bool> {
        let mut entries = self.store.get_entries();
        let now = now_iso();
        let mut moved = 0;
        for entry in entries.iter_mut().filter(|e| e.user_id == old_user_id) {
            entry.user_id = new_user_id.to_string();
            entry.updated_at = now.clone();
            moved += 1;
        }
        if moved == 0 {
            return Ok(false);
        }
        self.store.overwrite_entries(&entries)?;
        info!(from = old_user_id, to = new_user_id, moved, "relinked entries");
        Ok(true)
    }

    /// Drops every orphaned entry and returns how many went.
    pub fn cleanup_orphaned_data(&self) -> ServiceResult<usize> {
        let known = self.account_ids();
        let entries = self.store.get_entries();
        let before = entries.len();
        let kept: Vec<_> = entries
            .into_iter()
            .filter(|e| known.contains(&e.user_id))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.store.overwrite_entries(&kept)?;
            warn!(removed, "removed orphaned entries");
        }
        Ok(removed)
    }

    /// Orphans whose id equals an account's display name or username,
    /// ignoring case.
    pub fn suggested_associations(&self) -> Vec<SuggestedAssociation> {
        let users = self.auth.all_users();
        self.orphaned_data()
            .into_iter()
            .filter_map(|orphan| {
                let id = orphan.user_id.to_lowercase();
                let user = users
                    .iter()
                    .find(|u| u.name.to_lowercase() == id || u.username.to_lowercase() == id)?;
                Some(SuggestedAssociation {
                    orphaned_user_id: orphan.user_id,
                    user: user.clone(),
                })
            })
            .collect()
    }

    /// Relinks orphans whose id equals an account's display name, ignoring
    /// case. Returns how many orphaned ids were relinked.
    pub fn auto_associate_obvious_matches(&self) -> ServiceResult<usize> {
        let users = self.auth.all_users();
        let mut linked = 0;
        for orphan in self.orphaned_data() {
            let Some(user) = users
                .iter()
                .find(|u| u.name.to_lowercase() == orphan.user_id.to_lowercase())
            else {
                continue;
            };
            if self.associate_data_with_user(&orphan.user_id, &user.id)? {
                linked += 1;
            }
        }
        Ok(linked)
    }

    /// Creates an account for a teammate with their email as username.
    /// The admin stays signed in.
    pub async fn invite_user(&self, invite: Invite) -> ServiceResult<InvitedUser> {
        let email = invite.email.trim();
        let name = invite.name.trim();
        if email.is_empty() || name.is_empty() || invite.team_id.is_empty() {
            return Err(ValidationError::InviteFieldsRequired.into());
        }

        let chosen = invite
            .password
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from);
        let generated = chosen.is_none();
        let password = chosen.unwrap_or_else(generate_password);

        let user = self
            .auth
            .register(SignupData {
                username: email.to_string(),
                password: password.clone(),
                name: name.to_string(),
                email: Some(email.to_string()),
                team_id: invite.team_id,
            })
            .await?;
        info!(username = %user.username, "invited user");
        Ok(InvitedUser {
            user,
            password,
            generated,
        })
    }

    /// Wipes the four mirrored collections. Accounts are kept.
    pub fn wipe(&self) {
        self.store.clear_all_data();
        warn!("cleared all standup data");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::remote::RemoteMirror;
    use crate::types::{DEFAULT_TEAM_ID, StandupEntry};

    fn services() -> (Arc<LocalStore>, AuthService) {
        let store = Arc::new(LocalStore::in_memory());
        let auth = AuthService::new(store.clone(), Arc::new(RemoteMirror::disabled()));
        (store, auth)
    }

    fn signup(name: &str, username: &str) -> SignupData {
        SignupData {
            username: username.into(),
            password: "secret1".into(),
            name: name.into(),
            email: None,
            team_id: DEFAULT_TEAM_ID.into(),
        }
    }

    fn save(store: &LocalStore, user: &str, date: &str) {
        store
            .save_entry(StandupEntry::blank(user, DEFAULT_TEAM_ID, date))
            .unwrap();
    }

    #[tokio::test]
    async fn only_admins_open_the_tools() {
        let (store, auth) = services();
        assert!(matches!(
            AdminTools::open(&store, &auth),
            Err(AuthError::NotLoggedIn)
        ));

        auth.signup(signup("Lead", "lead")).await.unwrap();
        assert!(AdminTools::open(&store, &auth).is_ok());

        auth.signup(signup("Kim", "kim")).await.unwrap();
        assert!(matches!(
            AdminTools::open(&store, &auth),
            Err(AuthError::NotAdmin)
        ));
    }

    #[tokio::test]
    async fn orphans_are_grouped_with_their_latest_date() {
        let (store, auth) = services();
        let alex = auth.signup(signup("Alex", "alex")).await.unwrap();
        save(&store, &alex.id, "2024-01-01");
        save(&store, "bob", "2024-01-01");
        save(&store, "bob", "2024-01-05");
        save(&store, "carol", "2024-01-03");

        let orphans = AdminTools::new(&store, &auth).orphaned_data();
        assert_eq!(
            orphans,
            [
                OrphanSummary {
                    user_id: "bob".into(),
                    entry_count: 2,
                    latest_entry: "2024-01-05".into(),
                },
                OrphanSummary {
                    user_id: "carol".into(),
                    entry_count: 1,
                    latest_entry: "2024-01-03".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn associate_moves_entries_and_reports_empty_moves() {
        let (store, auth) = services();
        let bob = auth.signup(signup("Bob", "bob.smith")).await.unwrap();
        save(&store, "bob-old", "2024-01-01");
        save(&store, "bob-old", "2024-01-02");
        let admin = AdminTools::new(&store, &auth);

        assert!(admin.associate_data_with_user("bob-old", &bob.id).unwrap());
        assert_eq!(store.entries_for_user(&bob.id).len(), 2);
        assert!(admin.orphaned_data().is_empty());
        assert!(!admin.associate_data_with_user("nobody", &bob.id).unwrap());
    }

    #[tokio::test]
    async fn cleanup_keeps_only_entries_of_known_accounts() {
        let (store, auth) = services();
        let alex = auth.signup(signup("Alex", "alex")).await.unwrap();
        save(&store, &alex.id, "2024-01-01");
        save(&store, "ghost", "2024-01-01");
        save(&store, "ghost", "2024-01-02");

        let admin = AdminTools::new(&store, &auth);
        assert_eq!(admin.cleanup_orphaned_data().unwrap(), 2);
        assert_eq!(store.get_entries().len(), 1);
        assert_eq!(admin.cleanup_orphaned_data().unwrap(), 0);
    }

    #[tokio::test]
    async fn name_matches_link_automatically_and_usernames_are_suggested() {
        let (store, auth) = services();
        let alex = auth.signup(signup("Alex", "alex.k")).await.unwrap();
        let sam = auth.signup(signup("Samuel", "sam")).await.unwrap();
        save(&store, "ALEX", "2024-01-01");
        save(&store, "sam", "2024-01-01");
        let admin = AdminTools::new(&store, &auth);

        let suggestions = admin.suggested_associations();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].orphaned_user_id, "ALEX");
        assert_eq!(suggestions[0].user.id, alex.id);
        assert_eq!(suggestions[1].user.id, sam.id);

        assert_eq!(admin.auto_associate_obvious_matches().unwrap(), 1);
        assert_eq!(store.entries_for_user(&alex.id).len(), 1);
        assert_eq!(admin.orphaned_data()[0].user_id, "sam");
    }

    #[tokio::test]
    async fn invite_requires_fields_and_generates_a_password() {
        let (store, auth) = services();
        let me = auth.signup(signup("Admin", "admin")).await.unwrap();
        let admin = AdminTools::new(&store, &auth);

        let err = admin
            .invite_user(Invite {
                email: "kim@example.com".into(),
                team_id: DEFAULT_TEAM_ID.into(),
                ..Invite::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please fill in all required fields.");

        let invited = admin
            .invite_user(Invite {
                email: " kim@example.com ".into(),
                name: "Kim".into(),
                team_id: DEFAULT_TEAM_ID.into(),
                password: Some("  ".into()),
            })
            .await
            .unwrap();
        assert!(invited.generated);
        assert_eq!(invited.password.len(), 8);
        assert_eq!(invited.user.username, "kim@example.com");
        assert_eq!(invited.user.email.as_deref(), Some("kim@example.com"));
        assert_eq!(auth.current_user().map(|u| u.id), Some(me.id));
        assert!(store.get_users().iter().any(|u| u.id == invited.user.id));
    }

    #[tokio::test]
    async fn wipe_clears_entries_but_keeps_accounts() {
        let (store, auth) = services();
        auth.signup(signup("Alex", "alex")).await.unwrap();
        save(&store, "x", "2024-01-01");
        AdminTools::new(&store, &auth).wipe();
        assert!(store.get_entries().is_empty());
        assert_eq!(auth.all_users().len(), 1);
    }
}
