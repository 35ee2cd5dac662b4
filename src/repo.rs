use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

/// Single-table booking store. Every call touches at most one row, except
/// `list` which only reads.
#[async_trait]
pub trait BookingRepo: Send + Sync {
    /// Stores a new booking with [`DEFAULT_STATUS`] and returns its id.
    async fn insert(&self, new: NewBooking) -> RepoResult<Id>;
    /// Most recent first; `query` is assumed already clamped.
    async fn list(&self, query: &ListQuery) -> RepoResult<Vec<Booking>>;
    async fn get(&self, id: Id) -> RepoResult<Booking>;
    /// Applies `status` and/or `message`. A deleted booking stays deleted.
    async fn update_partial(&self, id: Id, patch: BookingPatch) -> RepoResult<Booking>;
    /// Idempotent; unknown ids are not an error.
    async fn soft_delete(&self, id: Id) -> RepoResult<()>;
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    #[derive(Clone, Serialize, Deserialize)]
    struct Row {
        #[serde(flatten)]
        booking: Booking,
        ip: Option<String>,
        user_agent: Option<String>,
    }

    #[derive(Clone, Default, Serialize, Deserialize)]
    struct State {
        bookings: HashMap<Id, Row>,
        next_id: Id,
    }

    /// Process-local store. With a snapshot path every write is flushed to a
    /// JSON file so a single node survives restarts.
    ///
    /// Writes hold the state lock until the snapshot is on disk, and a change
    /// only becomes visible once the flush succeeded.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        /// Loads `path` if it exists. An unreadable or corrupt snapshot is an
        /// error; starting empty would hand out ids that are already taken.
        pub fn with_snapshot(path: impl Into<PathBuf>) -> RepoResult<Self> {
            let path = path.into();
            let state = Self::load_state_from(&path)?;
            Ok(Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            })
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::info!("no snapshot at '{}'. Starting empty.", path.display());
                    return Ok(State::default());
                }
                Err(e) => {
                    log::error!("failed to read snapshot '{}': {e}", path.display());
                    return Err(RepoError::Internal(format!("reading {}: {e}", path.display())));
                }
            };
            let state = serde_json::from_slice::<State>(&bytes).map_err(|e| {
                log::error!("failed to parse snapshot '{}': {e}", path.display());
                RepoError::Internal(format!("parsing {}: {e}", path.display()))
            })?;
            log::info!("loaded {} bookings from '{}'", state.bookings.len(), path.display());
            Ok(state)
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Runs `change` against a copy of the state, flushes the copy and
        /// only then swaps it in. The write lock is held throughout so
        /// snapshots land in commit order.
        fn commit<T>(&self, change: impl FnOnce(&mut State) -> RepoResult<T>) -> RepoResult<T> {
            let mut guard = self.write()?;
            let Some(path) = self.snapshot_path.as_deref() else {
                return change(&mut *guard);
            };
            let mut next = guard.clone();
            let out = change(&mut next)?;
            write_snapshot(path, &next)?;
            *guard = next;
            Ok(out)
        }
    }

    /// Writes to a sibling temp file and renames it over `path`, so a crash
    /// leaves either the old snapshot or the new one.
    fn write_snapshot(path: &Path, state: &State) -> RepoResult<()> {
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| RepoError::Internal(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        let result = (|| -> std::io::Result<()> {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        })();
        result.map_err(|e| {
            log::error!("failed to write snapshot '{}': {e}", path.display());
            let _ = std::fs::remove_file(&tmp);
            RepoError::Internal(e.to_string())
        })
    }

    #[async_trait]
    impl BookingRepo for InMemRepo {
        async fn insert(&self, new: NewBooking) -> RepoResult<Id> {
            self.commit(|s| {
                s.next_id += 1;
                let id = s.next_id;
                let booking = Booking {
                    id,
                    created_at: Utc::now(),
                    site: new.site,
                    name: new.name,
                    email: new.email,
                    phone: new.phone,
                    start_date: new.start_date,
                    end_date: new.end_date,
                    message: new.message,
                    status: DEFAULT_STATUS.to_string(),
                    extras: new.extras.to_value(),
                };
                s.bookings.insert(id, Row { booking, ip: new.ip, user_agent: new.user_agent });
                Ok(id)
            })
        }

        async fn list(&self, query: &ListQuery) -> RepoResult<Vec<Booking>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.bookings.values()
                .map(|r| &r.booking)
                .filter(|b| query.include_deleted || !b.is_deleted())
                .filter(|b| query.site.as_ref().map_or(true, |site| &b.site == site))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            let offset = usize::try_from(query.offset).unwrap_or(0);
            let limit = usize::try_from(query.limit).unwrap_or(0);
            Ok(v.into_iter().skip(offset).take(limit).collect())
        }

        async fn get(&self, id: Id) -> RepoResult<Booking> {
            let s = self.read()?;
            s.bookings.get(&id).map(|r| r.booking.clone()).ok_or(RepoError::NotFound)
        }

        async fn update_partial(&self, id: Id, patch: BookingPatch) -> RepoResult<Booking> {
            self.commit(|s| {
                let booking = &mut s.bookings.get_mut(&id).ok_or(RepoError::NotFound)?.booking;
                if let Some(status) = patch.status {
                    if !booking.is_deleted() { booking.status = status; }
                }
                if let Some(message) = patch.message { booking.message = Some(message); }
                Ok(booking.clone())
            })
        }

        async fn soft_delete(&self, id: Id) -> RepoResult<()> {
            // already deleted or unknown: nothing to flush
            let pending = self.read()?.bookings.get(&id).is_some_and(|r| !r.booking.is_deleted());
            if !pending {
                return Ok(());
            }
            self.commit(|s| {
                if let Some(row) = s.bookings.get_mut(&id) {
                    row.booking.status = DELETED_STATUS.to_string();
                }
                Ok(())
            })
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    // provenance columns are write-only from the API's point of view
    const COLUMNS: &str = "id, created_at, site, name, email, phone, start_date, end_date, message, status, extras";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Applies the embedded schema migrations.
        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    #[async_trait]
    impl BookingRepo for PgRepo {
        async fn insert(&self, new: NewBooking) -> RepoResult<Id> {
            let id: Id = sqlx::query_scalar(
                "INSERT INTO bookings (site, name, email, phone, start_date, end_date, message, status, extras, ip, user_agent) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) RETURNING id"
            )
            .bind(&new.site)
            .bind(&new.name)
            .bind(&new.email)
            .bind(new.phone.as_ref())
            .bind(&new.start_date)
            .bind(&new.end_date)
            .bind(new.message.as_ref())
            .bind(DEFAULT_STATUS)
            .bind(new.extras.to_value())
            .bind(new.ip.as_ref())
            .bind(new.user_agent.as_ref())
            .fetch_one(&self.pool).await.map_err(internal)?;
            Ok(id)
        }

        async fn list(&self, query: &ListQuery) -> RepoResult<Vec<Booking>> {
            let sql = format!(
                "SELECT {COLUMNS} FROM bookings \
                 WHERE ($1::text IS NULL OR site = $1) AND ($2 OR status <> '{DELETED_STATUS}') \
                 ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
            );
            let recs = sqlx::query_as::<_, Booking>(&sql)
                .bind(query.site.as_ref())
                .bind(query.include_deleted)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool).await.map_err(internal)?;
            Ok(recs)
        }

        async fn get(&self, id: Id) -> RepoResult<Booking> {
            let sql = format!("SELECT {COLUMNS} FROM bookings WHERE id = $1");
            sqlx::query_as::<_, Booking>(&sql)
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn update_partial(&self, id: Id, patch: BookingPatch) -> RepoResult<Booking> {
            let sql = format!(
                "UPDATE bookings SET \
                 status = CASE WHEN status = '{DELETED_STATUS}' THEN status ELSE COALESCE($2, status) END, \
                 message = COALESCE($3, message) \
                 WHERE id = $1 RETURNING {COLUMNS}"
            );
            sqlx::query_as::<_, Booking>(&sql)
                .bind(id)
                .bind(patch.status.as_ref())
                .bind(patch.message.as_ref())
                .fetch_optional(&self.pool).await.map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn soft_delete(&self, id: Id) -> RepoResult<()> {
            sqlx::query("UPDATE bookings SET status = $2 WHERE id = $1")
                .bind(id)
                .bind(DELETED_STATUS)
                .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }
    }
}
