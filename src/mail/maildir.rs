//! Filesystem mailbox poller.
//!
//! Reads RFC 822 files from `<root>/<account-address>/<folder>/`, one
//! message per file. File names are the cursor: a mail delivery agent
//! that writes sortable names (timestamps, sequence numbers) gives the
//! detector a monotonic mailbox. Useful for local delivery setups and
//! development; network protocols live behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{MailboxPoller, RawInbound};
use crate::error::MailError;
use crate::model::Account;

pub struct MaildirPoller {
    root: PathBuf,
}

impl MaildirPoller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn folder_path(&self, account: &Account, folder: &str) -> PathBuf {
        self.root.join(&account.address).join(folder)
    }

    /// Message file names in the folder, sorted ascending. A missing
    /// folder is an empty mailbox, not an error.
    async fn list_names(&self, dir: &Path) -> Result<Vec<String>, MailError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| MailError::FetchFailed(format!("{}: {e}", dir.display())))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MailError::FetchFailed(e.to_string()))?
        {
            if entry
                .file_type()
                .await
                .map_err(|e| MailError::FetchFailed(e.to_string()))?
                .is_file()
            {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl MailboxPoller for MaildirPoller {
    async fn current_cursor(&self, account: &Account, folder: &str) -> Result<String, MailError> {
        let names = self.list_names(&self.folder_path(account, folder)).await?;
        Ok(names.last().cloned().unwrap_or_default())
    }

    async fn fetch_since(
        &self,
        account: &Account,
        folder: &str,
        cursor: &str,
    ) -> Result<Vec<RawInbound>, MailError> {
        let dir = self.folder_path(account, folder);
        let names = self.list_names(&dir).await?;

        let mut messages = Vec::new();
        for name in names.into_iter().filter(|n| n.as_str() > cursor) {
            let raw = tokio::fs::read(dir.join(&name))
                .await
                .map_err(|e| MailError::FetchFailed(format!("{name}: {e}")))?;
            messages.push(RawInbound { cursor: name, raw });
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::DEFAULT_FOLDER;

    async fn write_message(root: &Path, account: &Account, name: &str, body: &str) {
        let dir = root.join(&account.address).join(DEFAULT_FOLDER);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(name), body).await.unwrap();
    }

    #[tokio::test]
    async fn empty_mailbox_has_empty_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let poller = MaildirPoller::new(dir.path());
        let account = Account::new("owner", "me@example.com");

        let cursor = poller.current_cursor(&account, DEFAULT_FOLDER).await.unwrap();
        assert_eq!(cursor, "");
        assert!(
            poller
                .fetch_since(&account, DEFAULT_FOLDER, "")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn fetch_returns_only_newer_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let poller = MaildirPoller::new(dir.path());
        let account = Account::new("owner", "me@example.com");

        write_message(dir.path(), &account, "0001", "first").await;
        write_message(dir.path(), &account, "0002", "second").await;
        write_message(dir.path(), &account, "0003", "third").await;

        assert_eq!(
            poller.current_cursor(&account, DEFAULT_FOLDER).await.unwrap(),
            "0003"
        );

        let messages = poller
            .fetch_since(&account, DEFAULT_FOLDER, "0001")
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].cursor, "0002");
        assert_eq!(messages[0].raw, b"second");
        assert_eq!(messages[1].cursor, "0003");
    }

    #[tokio::test]
    async fn accounts_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let poller = MaildirPoller::new(dir.path());
        let a = Account::new("owner", "a@example.com");
        let b = Account::new("owner", "b@example.com");

        write_message(dir.path(), &a, "0001", "for a").await;

        assert_eq!(
            poller
                .fetch_since(&a, DEFAULT_FOLDER, "")
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            poller
                .fetch_since(&b, DEFAULT_FOLDER, "")
                .await
                .unwrap()
                .is_empty()
        );
    }
}
