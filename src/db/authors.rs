//! Author registry
//!
//! Authors register once with a wallet address and pen name; the
//! reconciliation engine resolves the wallet address from here before
//! touching the ledger.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::types::Result;

use super::sqlite::{ts, CacheDb};

/// Local author registry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub wallet_address: String,
    pub pen_name: String,
    pub created_at: DateTime<Utc>,
}

impl CacheDb {
    pub async fn insert_author(&self, author: Author) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO authors (id, wallet_address, pen_name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    author.id,
                    author.wallet_address,
                    author.pen_name,
                    author.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn author(&self, id: &str) -> Result<Option<Author>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, wallet_address, pen_name, created_at
                 FROM authors WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Author {
                        id: row.get(0)?,
                        wallet_address: row.get(1)?,
                        pen_name: row.get(2)?,
                        created_at: ts(row, 3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(id: &str) -> Author {
        Author {
            id: id.to_string(),
            wallet_address: format!("0xabc{id}"),
            pen_name: format!("Pen {id}"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_author(author("a1")).await.unwrap();

        let found = db.author("a1").await.unwrap().unwrap();
        assert_eq!(found.wallet_address, "0xabca1");
        assert!(db.author("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_wallet_address_is_rejected() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.insert_author(author("a1")).await.unwrap();

        let mut dup = author("a2");
        dup.wallet_address = "0xabca1".to_string();
        assert!(db.insert_author(dup).await.is_err());
    }
}
