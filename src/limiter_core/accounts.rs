//! Account directory: batched profile lookup with local persistence
//!
//! Profiles come from the accounts API in one batched request per
//! processed batch, covering only ids not already cached. Entries older
//! than one day are evicted before each request. Accounts the API cannot
//! resolve (deleted accounts, typically) are synthesized as worst-case
//! profiles: zero history and a creation date in the far future, so they
//! never reach the trusted tier and always get the strictest regime.
//!
//! The directory is persisted to a JSON file after every fetch and
//! reloaded on startup, surviving process restarts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Profiles older than this are refetched
pub const PROFILE_TTL_DAYS: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub account_id: i64,
    pub lifetime_changesets: u64,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl AccountProfile {
    /// Worst-case synthetic profile for an unresolvable account
    ///
    /// The far-future fetch timestamp keeps the entry from ever being
    /// evicted as stale, matching how deletions are permanent.
    pub fn unknown(account_id: i64) -> Self {
        Self {
            account_id,
            lifetime_changesets: 0,
            created_at: DateTime::<Utc>::MAX_UTC,
            fetched_at: DateTime::<Utc>::MAX_UTC,
        }
    }
}

#[derive(Debug)]
pub enum DirectoryError {
    Http(reqwest::Error),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        DirectoryError::Http(err)
    }
}

impl From<std::io::Error> for DirectoryError {
    fn from(err: std::io::Error) -> Self {
        DirectoryError::Io(err)
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        DirectoryError::Serialization(err)
    }
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Http(e) => write!(f, "accounts API request failed: {}", e),
            DirectoryError::Io(e) => write!(f, "accounts cache I/O failed: {}", e),
            DirectoryError::Serialization(e) => write!(f, "accounts cache serialization failed: {}", e),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Accounts API response shapes (only the fields the limiter reads)
#[derive(Debug, Deserialize)]
struct UsersResponse {
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    user: UserDocument,
}

#[derive(Debug, Deserialize)]
struct UserDocument {
    id: i64,
    account_created: DateTime<Utc>,
    changesets: ChangesetsSummary,
}

#[derive(Debug, Deserialize)]
struct ChangesetsSummary {
    count: u64,
}

pub struct AccountDirectory {
    client: reqwest::Client,
    api_url: String,
    cache_path: PathBuf,
    profiles: HashMap<i64, AccountProfile>,
}

impl AccountDirectory {
    pub fn new(api_url: String, cache_path: PathBuf) -> Self {
        let profiles = match load_profiles(&cache_path) {
            Ok(profiles) => {
                if !profiles.is_empty() {
                    log::info!(
                        "Loaded {} account profiles from {}",
                        profiles.len(),
                        cache_path.display()
                    );
                }
                profiles
            }
            Err(e) => {
                log::warn!(
                    "Could not load account cache {}: {}",
                    cache_path.display(),
                    e
                );
                HashMap::new()
            }
        };

        Self {
            client: reqwest::Client::new(),
            api_url,
            cache_path,
            profiles,
        }
    }

    /// Profile for an account, synthesized worst-case if unknown
    pub fn profile(&self, account_id: i64) -> AccountProfile {
        self.profiles
            .get(&account_id)
            .cloned()
            .unwrap_or_else(|| AccountProfile::unknown(account_id))
    }

    /// Evict profiles fetched more than [`PROFILE_TTL_DAYS`] ago
    fn evict_stale(&mut self, now: DateTime<Utc>) {
        self.profiles
            .retain(|_, p| now - p.fetched_at <= Duration::days(PROFILE_TTL_DAYS));
    }

    /// Ensure a fresh profile exists for every id in `account_ids`
    ///
    /// One batched API request covering only the ids missing after
    /// eviction; ids the API does not return are synthesized. The
    /// directory is persisted afterwards.
    pub async fn refresh(&mut self, account_ids: &[i64]) -> Result<(), DirectoryError> {
        let now = Utc::now();
        self.evict_stale(now);

        let missing: Vec<i64> = account_ids
            .iter()
            .copied()
            .filter(|id| !self.profiles.contains_key(id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let ids = missing
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}?users={}", self.api_url, ids);

        let response: UsersResponse = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        for entry in response.users {
            self.profiles.insert(
                entry.user.id,
                AccountProfile {
                    account_id: entry.user.id,
                    lifetime_changesets: entry.user.changesets.count,
                    created_at: entry.user.account_created,
                    fetched_at: now,
                },
            );
        }

        for id in missing {
            if !self.profiles.contains_key(&id) {
                log::debug!("Account {} not resolvable, using worst-case profile", id);
                self.profiles.insert(id, AccountProfile::unknown(id));
            }
        }

        save_profiles(&self.cache_path, &self.profiles)?;
        Ok(())
    }
}

fn load_profiles(path: &Path) -> Result<HashMap<i64, AccountProfile>, DirectoryError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn save_profiles(
    path: &Path,
    profiles: &HashMap<i64, AccountProfile>,
) -> Result<(), DirectoryError> {
    let json = serde_json::to_string(profiles)?;
    std::fs::write(path, json)?;
    log::debug!("Saved {} account profiles to {}", profiles.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_profile_is_worst_case() {
        let profile = AccountProfile::unknown(42);
        assert_eq!(profile.lifetime_changesets, 0);
        assert!(profile.created_at > now() + Duration::days(365 * 100));
    }

    #[test]
    fn test_profile_falls_back_to_unknown() {
        let temp_dir = tempfile::tempdir().unwrap();
        let directory = AccountDirectory::new(
            "http://127.0.0.1:1/users".to_string(),
            temp_dir.path().join("accounts.json"),
        );
        let profile = directory.profile(99);
        assert_eq!(profile.account_id, 99);
        assert_eq!(profile.lifetime_changesets, 0);
    }

    #[test]
    fn test_eviction_drops_only_stale_profiles() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut directory = AccountDirectory::new(
            "http://127.0.0.1:1/users".to_string(),
            temp_dir.path().join("accounts.json"),
        );

        directory.profiles.insert(
            1,
            AccountProfile {
                account_id: 1,
                lifetime_changesets: 10,
                created_at: now() - Duration::days(100),
                fetched_at: now() - Duration::hours(2),
            },
        );
        directory.profiles.insert(
            2,
            AccountProfile {
                account_id: 2,
                lifetime_changesets: 10,
                created_at: now() - Duration::days(100),
                fetched_at: now() - Duration::days(2),
            },
        );
        // Synthetic entries are never stale
        directory.profiles.insert(3, AccountProfile::unknown(3));

        directory.evict_stale(now());

        assert!(directory.profiles.contains_key(&1));
        assert!(!directory.profiles.contains_key(&2));
        assert!(directory.profiles.contains_key(&3));
    }

    #[test]
    fn test_profiles_round_trip_through_cache_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("accounts.json");

        let mut profiles = HashMap::new();
        profiles.insert(
            7,
            AccountProfile {
                account_id: 7,
                lifetime_changesets: 123,
                created_at: now() - Duration::days(500),
                fetched_at: now(),
            },
        );
        profiles.insert(8, AccountProfile::unknown(8));

        save_profiles(&path, &profiles).unwrap();
        let loaded = load_profiles(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&7].lifetime_changesets, 123);
        assert_eq!(loaded[&8].lifetime_changesets, 0);
    }

    #[test]
    fn test_users_response_parses_api_document() {
        let json = r#"{
            "version": "0.6",
            "users": [
                {"user": {
                    "id": 7,
                    "display_name": "alice",
                    "account_created": "2020-01-15T08:30:00Z",
                    "changesets": {"count": 321},
                    "traces": {"count": 0}
                }}
            ]
        }"#;
        let response: UsersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.users.len(), 1);
        assert_eq!(response.users[0].user.id, 7);
        assert_eq!(response.users[0].user.changesets.count, 321);
    }
}
