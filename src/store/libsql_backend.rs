//! libSQL backend: async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. Campaign steps and
//! schedules are stored as JSON columns; the stat counters are plain
//! integer columns so increments can be single UPDATE statements.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Account, Campaign, CampaignStats, CampaignStatus, Category, Lead, LeadStatus, Schedule,
    StatField, Step, StoredInbound,
};
use crate::store::migrations;
use crate::store::traits::Store;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        // libsql's bundled SQLite is built with SQLITE_DEFAULT_FOREIGN_KEYS=1;
        // this backend handles referential cleanup itself (see delete_campaign).
        conn.execute("PRAGMA foreign_keys = OFF", ())
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to set pragma: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = OFF", ())
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to set pragma: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn query_err(e: libsql::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

const CAMPAIGN_COLUMNS: &str = "id, owner, name, status, account_id, steps, schedule, \
     stat_total_leads, stat_sent, stat_replied, stat_failed, \
     auto_reply_enabled, positive_category, created_at, updated_at";

const LEAD_COLUMNS: &str =
    "id, campaign_id, email, status, current_step, last_contacted_at, replied_at, created_at, updated_at";

const INBOUND_COLUMNS: &str =
    "id, external_id, account_id, folder, sender, subject, body, category, received_at, created_at";

/// Map a libsql Row to a Campaign.
fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, StoreError> {
    let id: String = row.get(0).map_err(query_err)?;
    let status: String = row.get(3).map_err(query_err)?;
    let account_id: String = row.get(4).map_err(query_err)?;
    let steps_json: String = row.get(5).map_err(query_err)?;
    let schedule_json: String = row.get(6).map_err(query_err)?;
    let positive: String = row.get(12).map_err(query_err)?;
    let created: String = row.get(13).map_err(query_err)?;
    let updated: String = row.get(14).map_err(query_err)?;

    let steps: Vec<Step> = serde_json::from_str(&steps_json)
        .map_err(|e| StoreError::Serialization(format!("steps column: {e}")))?;
    let schedule: Schedule = serde_json::from_str(&schedule_json)
        .map_err(|e| StoreError::Serialization(format!("schedule column: {e}")))?;

    Ok(Campaign {
        id: parse_uuid(&id),
        owner: row.get(1).map_err(query_err)?,
        name: row.get(2).map_err(query_err)?,
        status: status.parse().unwrap_or(CampaignStatus::Draft),
        account_id: parse_uuid(&account_id),
        steps,
        schedule,
        stats: CampaignStats {
            total_leads: row.get(7).map_err(query_err)?,
            sent: row.get(8).map_err(query_err)?,
            replied: row.get(9).map_err(query_err)?,
            failed: row.get(10).map_err(query_err)?,
        },
        auto_reply_enabled: row.get::<i64>(11).map_err(query_err)? != 0,
        positive_category: positive.parse().unwrap_or(Category::Interested),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Map a libsql Row to a Lead.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, StoreError> {
    let id: String = row.get(0).map_err(query_err)?;
    let campaign_id: String = row.get(1).map_err(query_err)?;
    let status: String = row.get(3).map_err(query_err)?;
    let last_contacted: Option<String> = row.get(5).ok();
    let replied: Option<String> = row.get(6).ok();
    let created: String = row.get(7).map_err(query_err)?;
    let updated: String = row.get(8).map_err(query_err)?;

    Ok(Lead {
        id: parse_uuid(&id),
        campaign_id: parse_uuid(&campaign_id),
        email: row.get(2).map_err(query_err)?,
        status: status.parse().unwrap_or(LeadStatus::Pending),
        current_step: row.get::<i64>(4).map_err(query_err)? as i32,
        last_contacted_at: parse_optional_datetime(&last_contacted),
        replied_at: parse_optional_datetime(&replied),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Map a libsql Row to a StoredInbound.
fn row_to_inbound(row: &libsql::Row) -> Result<StoredInbound, StoreError> {
    let id: String = row.get(0).map_err(query_err)?;
    let account_id: String = row.get(2).map_err(query_err)?;
    let category: Option<String> = row.get(7).ok();
    let received: String = row.get(8).map_err(query_err)?;
    let created: String = row.get(9).map_err(query_err)?;

    Ok(StoredInbound {
        id: parse_uuid(&id),
        external_id: row.get(1).map_err(query_err)?,
        account_id: parse_uuid(&account_id),
        folder: row.get(3).map_err(query_err)?,
        sender: row.get(4).map_err(query_err)?,
        subject: row.get(5).map_err(query_err)?,
        body: row.get(6).map_err(query_err)?,
        category: category.and_then(|c| c.parse().ok()),
        received_at: parse_datetime(&received),
        created_at: parse_datetime(&created),
    })
}

fn row_to_account(row: &libsql::Row) -> Result<Account, StoreError> {
    let id: String = row.get(0).map_err(query_err)?;
    let expires: Option<String> = row.get(4).ok();
    let created: String = row.get(5).map_err(query_err)?;

    Ok(Account {
        id: parse_uuid(&id),
        owner: row.get(1).map_err(query_err)?,
        address: row.get(2).map_err(query_err)?,
        display_name: row.get(3).ok(),
        token_expires_at: parse_optional_datetime(&expires),
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Campaigns ───────────────────────────────────────────────────

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let steps = serde_json::to_string(&campaign.steps)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let schedule = serde_json::to_string(&campaign.schedule)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO campaigns (id, owner, name, status, account_id, steps, schedule, \
                 stat_total_leads, stat_sent, stat_replied, stat_failed, \
                 auto_reply_enabled, positive_category, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    campaign.id.to_string(),
                    campaign.owner.clone(),
                    campaign.name.clone(),
                    campaign.status.as_str(),
                    campaign.account_id.to_string(),
                    steps,
                    schedule,
                    campaign.stats.total_leads,
                    campaign.stats.sent,
                    campaign.stats.replied,
                    campaign.stats.failed,
                    campaign.auto_reply_enabled as i64,
                    campaign.positive_category.as_str(),
                    campaign.created_at.to_rfc3339(),
                    campaign.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_campaign(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let steps = serde_json::to_string(&campaign.steps)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let schedule = serde_json::to_string(&campaign.schedule)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "UPDATE campaigns SET owner = ?2, name = ?3, status = ?4, account_id = ?5, \
                 steps = ?6, schedule = ?7, auto_reply_enabled = ?8, positive_category = ?9, \
                 updated_at = ?10 WHERE id = ?1",
                params![
                    campaign.id.to_string(),
                    campaign.owner.clone(),
                    campaign.name.clone(),
                    campaign.status.as_str(),
                    campaign.account_id.to_string(),
                    steps,
                    schedule,
                    campaign.auto_reply_enabled as i64,
                    campaign.positive_category.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn delete_campaign(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn();
        // Explicit child deletes: libsql does not enforce ON DELETE CASCADE
        // unless foreign keys are enabled on the connection.
        conn.execute(
            "DELETE FROM leads WHERE campaign_id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(query_err)?;
        conn.execute(
            "DELETE FROM context_snippets WHERE campaign_id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(query_err)?;
        conn.execute("DELETE FROM campaigns WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE campaigns SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(query_err)?;

        if affected == 0 {
            return Err(StoreError::not_found("campaign", id));
        }
        Ok(())
    }

    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status = 'active' \
                     ORDER BY created_at"
                ),
                (),
            )
            .await
            .map_err(query_err)?;

        let mut campaigns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            campaigns.push(row_to_campaign(&row)?);
        }
        Ok(campaigns)
    }

    async fn increment_stat(
        &self,
        campaign_id: Uuid,
        field: StatField,
        delta: i64,
    ) -> Result<(), StoreError> {
        let col = field.column();
        self.conn()
            .execute(
                &format!("UPDATE campaigns SET {col} = {col} + ?1, updated_at = ?2 WHERE id = ?3"),
                params![delta, Utc::now().to_rfc3339(), campaign_id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &Lead) -> Result<bool, StoreError> {
        let result = self
            .conn()
            .execute(
                "INSERT INTO leads (id, campaign_id, email, status, current_step, \
                 last_contacted_at, replied_at, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    lead.id.to_string(),
                    lead.campaign_id.to_string(),
                    lead.email.clone(),
                    lead.status.as_str(),
                    lead.current_step as i64,
                    opt_text(lead.last_contacted_at.map(|t| t.to_rfc3339())),
                    opt_text(lead.replied_at.map(|t| t.to_rfc3339())),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("UNIQUE") => Ok(false),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_lead_by_sender(
        &self,
        account_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, StoreError> {
        // Prefer leads in active campaigns when the same address appears
        // in more than one campaign on this account.
        let mut rows = self
            .conn()
            .query(
                "SELECT l.id, l.campaign_id, l.email, l.status, l.current_step, \
                 l.last_contacted_at, l.replied_at, l.created_at, l.updated_at \
                 FROM leads l JOIN campaigns c ON l.campaign_id = c.id \
                 WHERE c.account_id = ?1 AND l.email = ?2 \
                 ORDER BY (c.status = 'active') DESC, l.created_at DESC LIMIT 1",
                params![account_id.to_string(), email.trim().to_lowercase()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE leads SET status = ?2, current_step = ?3, last_contacted_at = ?4, \
                 replied_at = ?5, updated_at = ?6 WHERE id = ?1",
                params![
                    lead.id.to_string(),
                    lead.status.as_str(),
                    lead.current_step as i64,
                    opt_text(lead.last_contacted_at.map(|t| t.to_rfc3339())),
                    opt_text(lead.replied_at.map(|t| t.to_rfc3339())),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_leads_page(
        &self,
        campaign_id: Uuid,
        statuses: &[LeadStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Lead>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE campaign_id = ?1 AND status IN ({}) \
             ORDER BY created_at LIMIT {limit} OFFSET {offset}",
            placeholders.join(", ")
        );

        let mut values: Vec<libsql::Value> =
            vec![libsql::Value::Text(campaign_id.to_string())];
        for status in statuses {
            values.push(libsql::Value::Text(status.as_str().to_string()));
        }

        let mut rows = self.conn().query(&sql, values).await.map_err(query_err)?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            leads.push(row_to_lead(&row)?);
        }
        Ok(leads)
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO accounts (id, owner, address, display_name, token_expires_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    account.id.to_string(),
                    account.owner.clone(),
                    account.address.clone(),
                    opt_text(account.display_name.clone()),
                    opt_text(account.token_expires_at.map(|t| t.to_rfc3339())),
                    account.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, owner, address, display_name, token_expires_at, created_at \
                 FROM accounts WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn set_account_token_expiry(
        &self,
        id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE accounts SET token_expires_at = ?1 WHERE id = ?2",
                params![opt_text(expires_at.map(|t| t.to_rfc3339())), id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Mailbox watermarks ──────────────────────────────────────────

    async fn get_watermark(
        &self,
        account_id: Uuid,
        folder: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT cursor FROM watermarks WHERE account_id = ?1 AND folder = ?2",
                params![account_id.to_string(), folder],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn set_watermark(
        &self,
        account_id: Uuid,
        folder: &str,
        cursor: &str,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO watermarks (account_id, folder, cursor, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (account_id, folder) DO UPDATE SET cursor = ?3, updated_at = ?4",
                params![
                    account_id.to_string(),
                    folder,
                    cursor,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Inbound messages ────────────────────────────────────────────

    async fn insert_inbound(&self, message: &StoredInbound) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO inbound_messages \
                 (id, external_id, account_id, folder, sender, subject, body, category, received_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id.to_string(),
                    message.external_id.clone(),
                    message.account_id.to_string(),
                    message.folder.clone(),
                    message.sender.clone(),
                    message.subject.clone(),
                    message.body.clone(),
                    opt_text(message.category.map(|c| c.as_str().to_string())),
                    message.received_at.to_rfc3339(),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_inbound_category(&self, id: Uuid, category: Category) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE inbound_messages SET category = ?1 WHERE id = ?2",
                params![category.as_str(), id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn latest_inbound_by_sender(
        &self,
        account_id: Uuid,
        folder: &str,
        sender: &str,
    ) -> Result<Option<StoredInbound>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INBOUND_COLUMNS} FROM inbound_messages \
                     WHERE account_id = ?1 AND folder = ?2 AND sender = ?3 \
                     ORDER BY received_at DESC LIMIT 1"
                ),
                params![account_id.to_string(), folder, sender.trim().to_lowercase()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_inbound(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_inbound_by_sender(
        &self,
        account_id: Uuid,
        sender: &str,
    ) -> Result<Vec<StoredInbound>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INBOUND_COLUMNS} FROM inbound_messages \
                     WHERE account_id = ?1 AND sender = ?2 ORDER BY received_at"
                ),
                params![account_id.to_string(), sender.trim().to_lowercase()],
            )
            .await
            .map_err(query_err)?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            messages.push(row_to_inbound(&row)?);
        }
        Ok(messages)
    }

    // ── Context snippets ────────────────────────────────────────────

    async fn insert_context_snippet(
        &self,
        campaign_id: Uuid,
        text: &str,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO context_snippets (id, campaign_id, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    campaign_id.to_string(),
                    text,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_context_snippets(&self, campaign_id: Uuid) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT content FROM context_snippets WHERE campaign_id = ?1 ORDER BY created_at",
                params![campaign_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut snippets = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            snippets.push(row.get(0).map_err(query_err)?);
        }
        Ok(snippets)
    }
}
