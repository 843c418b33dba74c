#![forbid(unsafe_code)]

use instr_core::{Account, AccountId, Identifier, NewAccount, ProviderInfo};
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use super::error::{DatabaseError, StoreError};
use super::{SqliteStore, map_insert_conflict, new_opaque_id, now_ms};

const ACCOUNT_COLUMNS: &str = "id, name, email, provider, provider_id, provider_url, provider_img, provider_name, created_at_ms";

impl SqliteStore {
    /// Registers a new account. Name and email must each be unused among live accounts.
    pub fn create_account(&mut self, request: &NewAccount) -> Result<Account, StoreError> {
        let name = request.validate()?;
        let id = AccountId::try_new(new_opaque_id())
            .map_err(|err| StoreError::Database(DatabaseError::CorruptRow(err.to_string())))?;

        let account = Account {
            id,
            name,
            email: request.email.clone(),
            provider: request.provider.clone(),
            deleted: false,
            created_at_ms: now_ms(),
        };

        let insert = self.conn.execute(
            "INSERT INTO accounts(id, name, email, provider, provider_id, provider_url, provider_img, provider_name, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                account.id.as_str(),
                account.name.as_str(),
                account.email,
                account.provider.provider,
                account.provider.provider_id,
                account.provider.provider_url,
                account.provider.provider_img,
                account.provider.provider_name,
                account.created_at_ms,
            ],
        );
        if let Err(err) = insert {
            return Err(map_insert_conflict(err, "account"));
        }

        debug!(account_id = %account.id, name = %account.name, "account created");
        Ok(account)
    }

    pub fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id=?1"),
                params![id.as_str()],
                account_row,
            )
            .optional()?;
        row.map(into_account).transpose()
    }

    /// Looks an account up by email when the needle contains `@`, by name otherwise.
    pub fn find_account(&self, name_or_email: &str) -> Result<Option<Account>, StoreError> {
        let column = if name_or_email.contains('@') {
            "email"
        } else {
            "name"
        };
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column}=?1"),
                params![name_or_email],
                account_row,
            )
            .optional()?;
        row.map(into_account).transpose()
    }

    /// Moves the account from the live set into the archive. The archive is
    /// never read back by `get_account` or `find_account`.
    pub fn delete_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let archived = tx.execute(
            &format!(
                "INSERT INTO deleted_accounts({ACCOUNT_COLUMNS}, deleted_at_ms) \
                 SELECT {ACCOUNT_COLUMNS}, ?2 FROM accounts WHERE id=?1"
            ),
            params![account.id.as_str(), now_ms()],
        )?;
        tx.execute(
            "DELETE FROM accounts WHERE id=?1",
            params![account.id.as_str()],
        )?;
        tx.commit()?;

        if archived > 0 {
            debug!(account_id = %account.id, name = %account.name, "account archived");
        }
        Ok(())
    }

    /// Archived accounts that once held `name`, oldest first.
    pub fn deleted_accounts(&self, name: &str) -> Result<Vec<Account>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM deleted_accounts WHERE name=?1 ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map(params![name], account_row)?;

        let mut out = Vec::new();
        for row in rows {
            let mut account = into_account(row?)?;
            account.deleted = true;
            out.push(account);
        }
        Ok(out)
    }
}

struct AccountRow {
    id: String,
    name: String,
    email: String,
    provider: ProviderInfo,
    created_at_ms: i64,
}

fn account_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        provider: ProviderInfo {
            provider: row.get(3)?,
            provider_id: row.get(4)?,
            provider_url: row.get(5)?,
            provider_img: row.get(6)?,
            provider_name: row.get(7)?,
        },
        created_at_ms: row.get(8)?,
    })
}

fn into_account(row: AccountRow) -> Result<Account, StoreError> {
    let corrupt = |detail: String| StoreError::Database(DatabaseError::CorruptRow(detail));
    Ok(Account {
        id: AccountId::try_new(row.id).map_err(|err| corrupt(format!("account id: {err}")))?,
        name: Identifier::try_new(row.name)
            .map_err(|err| corrupt(format!("account name: {err}")))?,
        email: row.email,
        provider: row.provider,
        deleted: false,
        created_at_ms: row.created_at_ms,
    })
}
