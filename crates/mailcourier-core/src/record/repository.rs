//! Email record storage.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::model::{EmailId, EmailRecord, NewEmail, fan_out};
use crate::message::{Attachment, Mailbox, Message};
use crate::{Error, Result};

const RECORD_COLUMNS: &str = "id, sender_address, sender_name, subject, recipient, \
     message_txt, message_html, scheduled_at, sent_at, error";

/// Repository for email records and their attachments.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct EmailRepository {
    pool: SqlitePool,
    attachments: bool,
}

impl EmailRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self {
            pool,
            attachments: true,
        };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self {
            pool,
            attachments: true,
        };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Disables attachment support: links are no longer written and records
    /// load without attachments.
    #[must_use]
    pub fn without_attachments(mut self) -> Self {
        self.attachments = false;
        self
    }

    /// Returns whether attachments are stored and loaded.
    #[must_use]
    pub const fn attachments_enabled(&self) -> bool {
        self.attachments
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_address TEXT NOT NULL,
                sender_name TEXT,
                subject TEXT NOT NULL,
                recipient TEXT NOT NULL,
                message_txt TEXT,
                message_html TEXT,
                scheduled_at TEXT NOT NULL,
                sent_at TEXT,
                error TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_pending ON emails(sent_at, scheduled_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                data BLOB NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_attachments (
                email_id INTEGER NOT NULL REFERENCES emails(id),
                attachment_id INTEGER NOT NULL REFERENCES attachments(id),
                PRIMARY KEY (email_id, attachment_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores one record per recipient, each committed on its own.
    ///
    /// Attachments are stored once, up front, and linked to every record.
    /// Returns the stored records in recipient order.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; records committed before the
    /// failure stay stored.
    pub async fn insert_each(
        &self,
        message: &Message,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Vec<EmailRecord>> {
        let drafts = fan_out(message, scheduled_at);
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let attachment_ids = {
            let mut tx = self.pool.begin().await?;
            let ids = self.store_attachments(&mut *tx, &message.attachments).await?;
            tx.commit().await?;
            ids
        };

        let mut records = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let mut tx = self.pool.begin().await?;
            let id = insert_row(&mut *tx, &draft, &attachment_ids).await?;
            tx.commit().await?;

            records.push(self.stored(id, draft, &message.attachments));
        }
        Ok(records)
    }

    /// Stores one record per recipient in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is stored then.
    pub async fn insert_all(
        &self,
        message: &Message,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Vec<EmailId>> {
        let drafts = fan_out(message, scheduled_at);
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let attachment_ids = self.store_attachments(&mut *tx, &message.attachments).await?;
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            ids.push(insert_row(&mut *tx, draft, &attachment_ids).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn store_attachments(
        &self,
        conn: &mut SqliteConnection,
        attachments: &[Attachment],
    ) -> Result<Vec<i64>> {
        if !self.attachments {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let result = sqlx::query(
                r"
                INSERT INTO attachments (filename, content_type, data)
                VALUES (?, ?, ?)
                ",
            )
            .bind(&attachment.filename)
            .bind(&attachment.content_type)
            .bind(&attachment.data)
            .execute(&mut *conn)
            .await?;
            ids.push(result.last_insert_rowid());
        }
        Ok(ids)
    }

    fn stored(&self, id: EmailId, draft: NewEmail, attachments: &[Attachment]) -> EmailRecord {
        EmailRecord {
            id,
            sender: draft.sender,
            recipient: draft.recipient,
            subject: draft.subject,
            message_txt: draft.message_txt,
            message_html: draft.message_html,
            attachments: if self.attachments {
                attachments.to_vec()
            } else {
                Vec::new()
            },
            scheduled_at: draft.scheduled_at,
            sent_at: None,
            error: None,
        }
    }

    /// Records the outcome of a delivery attempt.
    ///
    /// Only pending records are updated. Returns false if the record was
    /// already marked (or does not exist).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_sent(
        &self,
        id: EmailId,
        sent_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE emails SET sent_at = ?, error = ?
            WHERE id = ? AND sent_at IS NULL
            ",
        )
        .bind(timestamp(sent_at))
        .bind(error)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts records whose `sent_at` is strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_sent_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM emails WHERE sent_at > ?")
            .bind(timestamp(since))
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(row.get::<i64, _>("n")).unwrap_or_default())
    }

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored timestamp is invalid.
    pub async fn get(&self, id: EmailId) -> Result<Option<EmailRecord>> {
        let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM emails WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load(&row).await?)),
            None => Ok(None),
        }
    }

    /// All pending records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored timestamp is invalid.
    pub async fn unsent(&self) -> Result<Vec<EmailRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM emails WHERE sent_at IS NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.load_all(&rows).await
    }

    /// Pending records whose scheduled time is at or before `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored timestamp is invalid.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<EmailRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM emails \
             WHERE sent_at IS NULL AND scheduled_at <= ? ORDER BY id"
        ))
        .bind(timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        self.load_all(&rows).await
    }

    async fn load_all(&self, rows: &[SqliteRow]) -> Result<Vec<EmailRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.load(row).await?);
        }
        Ok(records)
    }

    async fn load(&self, row: &SqliteRow) -> Result<EmailRecord> {
        let id = EmailId(row.get("id"));
        let sent_at: Option<String> = row.get("sent_at");

        Ok(EmailRecord {
            id,
            sender: Mailbox::new(row.get("sender_name"), row.get::<String, _>("sender_address")),
            recipient: row.get("recipient"),
            subject: row.get("subject"),
            message_txt: row.get("message_txt"),
            message_html: row.get("message_html"),
            attachments: self.attachments_for(id).await?,
            scheduled_at: parse_timestamp(&row.get::<String, _>("scheduled_at"))?,
            sent_at: sent_at.as_deref().map(parse_timestamp).transpose()?,
            error: row.get("error"),
        })
    }

    async fn attachments_for(&self, id: EmailId) -> Result<Vec<Attachment>> {
        if !self.attachments {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r"
            SELECT a.filename, a.content_type, a.data
            FROM attachments a
            JOIN email_attachments ea ON ea.attachment_id = a.id
            WHERE ea.email_id = ?
            ORDER BY a.id
            ",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Attachment {
                filename: row.get("filename"),
                content_type: row.get("content_type"),
                data: row.get("data"),
            })
            .collect())
    }
}

async fn insert_row(
    conn: &mut SqliteConnection,
    draft: &NewEmail,
    attachment_ids: &[i64],
) -> Result<EmailId> {
    let result = sqlx::query(
        r"
        INSERT INTO emails
            (sender_address, sender_name, subject, recipient, message_txt, message_html, scheduled_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&draft.sender.address)
    .bind(draft.sender.name.as_deref())
    .bind(&draft.subject)
    .bind(&draft.recipient)
    .bind(draft.message_txt.as_deref())
    .bind(draft.message_html.as_deref())
    .bind(timestamp(draft.scheduled_at))
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    for attachment_id in attachment_ids {
        sqlx::query("INSERT INTO email_attachments (email_id, attachment_id) VALUES (?, ?)")
            .bind(id)
            .bind(attachment_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(EmailId(id))
}

/// Fixed-width UTC form so that string order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{value}: {e}")))
}
