#![forbid(unsafe_code)]

use instr_core::model::{identifier, normalize_tags};
use instr_core::{
    Account, AccountId, Identifier, Instruction, InstructionDocument, InstructionId,
    ValidationError,
};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, warn};

use super::error::{DatabaseError, StoreError};
use super::history::{HistoryKey, VersionHistory};
use super::requests::SaveInstructionRequest;
use super::{SqliteStore, map_insert_conflict, new_opaque_id, now_ms};

impl SqliteStore {
    /// `None` when either the owner or the document does not exist.
    pub fn find_instruction(
        &self,
        owner_name: &str,
        name: &str,
    ) -> Result<Option<InstructionDocument>, StoreError> {
        let Some(owner) = self.find_account(owner_name)? else {
            return Ok(None);
        };
        let row = self
            .conn
            .query_row(
                "SELECT id, creator_id, name, body FROM instructions WHERE creator_id=?1 AND name=?2",
                params![owner.id.as_str(), name],
                document_row,
            )
            .optional()?;
        row.map(|row| into_document(&self.conn, row)).transpose()
    }

    /// `None` when the owner does not exist, an empty list when it owns nothing.
    pub fn instructions_for_owner(
        &self,
        owner_name: &str,
    ) -> Result<Option<Vec<InstructionDocument>>, StoreError> {
        let Some(owner) = self.find_account(owner_name)? else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(
            "SELECT id, creator_id, name, body FROM instructions \
             WHERE creator_id=?1 \
             ORDER BY created_at_ms ASC, name ASC",
        )?;
        let rows = stmt.query_map(params![owner.id.as_str()], document_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(into_document(&self.conn, row?)?);
        }
        Ok(Some(out))
    }

    /// `None` when the owner does not exist, an empty list when no document carries `tag`.
    pub fn instructions_tagged(
        &self,
        owner_name: &str,
        tag: &str,
    ) -> Result<Option<Vec<InstructionDocument>>, StoreError> {
        let Some(owner) = self.find_account(owner_name)? else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.creator_id, i.name, i.body \
             FROM instructions i \
             JOIN instruction_tags t ON t.instruction_id = i.id \
             WHERE i.creator_id=?1 AND t.tag=?2 \
             ORDER BY i.created_at_ms ASC, i.name ASC",
        )?;
        let rows = stmt.query_map(params![owner.id.as_str(), tag], document_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(into_document(&self.conn, row?)?);
        }
        Ok(Some(out))
    }

    /// Creates the document at `(owner, name)` or overwrites its body and tags.
    ///
    /// The history commit lands before the record write. If the record write
    /// then fails the commit stays; the failure is returned as a database error.
    pub fn save_or_create_instruction<H: VersionHistory>(
        &mut self,
        history: &mut H,
        owner: &Account,
        request: SaveInstructionRequest,
    ) -> Result<InstructionDocument, StoreError> {
        let name = identifier("name", &request.name)?;
        let tags = normalize_tags(&request.tags)?;
        let instruction = Instruction::from_value(&request.instruction).map_err(|err| {
            let rejected = err
                .path
                .resolve(&request.instruction)
                .unwrap_or(&request.instruction)
                .to_string();
            ValidationError::new("instruction", rejected, err)
        })?;

        let Some(creator) = self.get_account(&owner.id)? else {
            return Err(StoreError::OwnerMissing {
                account_id: owner.id.clone(),
            });
        };

        let existing = existing_id(&self.conn, &creator.id, &name)?;
        let id = match &existing {
            Some(id) => id.clone(),
            None => InstructionId::try_new(new_opaque_id())
                .map_err(|err| StoreError::Database(DatabaseError::CorruptRow(err.to_string())))?,
        };

        let key = HistoryKey::new(creator.id.clone(), id.clone());
        let commit_id = history.commit(&key, &instruction, &creator.signature())?;

        let document = InstructionDocument {
            id,
            creator_id: creator.id.clone(),
            name,
            tags,
            instruction,
        };

        if let Err(err) = self.persist_document(&document, existing.is_some()) {
            warn!(
                instruction_id = %document.id,
                commit_id = %commit_id,
                error = %err,
                "history commit recorded but instruction write failed"
            );
            return Err(err);
        }

        debug!(
            instruction_id = %document.id,
            owner = %creator.name,
            name = %document.name,
            created = existing.is_none(),
            "instruction saved"
        );
        Ok(document)
    }

    /// Removes the live record. Returns whether anything was removed.
    pub fn delete_instruction(&mut self, document: &InstructionDocument) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM instructions WHERE id=?1",
            params![document.id.as_str()],
        )?;
        if removed > 0 {
            debug!(instruction_id = %document.id, name = %document.name, "instruction deleted");
        }
        Ok(removed == 1)
    }

    fn persist_document(
        &mut self,
        document: &InstructionDocument,
        update: bool,
    ) -> Result<(), StoreError> {
        let now = now_ms();
        let body = document.instruction.to_json_string();

        let tx = self.conn.transaction()?;
        let updated = if update {
            tx.execute(
                "UPDATE instructions SET body=?2, updated_at_ms=?3 WHERE id=?1",
                params![document.id.as_str(), body, now],
            )?
        } else {
            0
        };

        // A concurrent delete between lookup and write leaves nothing to update.
        if updated == 0 {
            let insert = tx.execute(
                "INSERT INTO instructions(id, creator_id, name, body, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    document.id.as_str(),
                    document.creator_id.as_str(),
                    document.name.as_str(),
                    body,
                    now,
                ],
            );
            if let Err(err) = insert {
                return Err(map_insert_conflict(err, "instruction"));
            }
        }

        replace_tags_tx(&tx, &document.id, &document.tags)?;
        tx.commit()?;
        Ok(())
    }
}

struct DocumentRow {
    id: String,
    creator_id: String,
    name: String,
    body: String,
}

fn document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        name: row.get(2)?,
        body: row.get(3)?,
    })
}

fn into_document(conn: &Connection, row: DocumentRow) -> Result<InstructionDocument, StoreError> {
    let corrupt = |detail: String| StoreError::Database(DatabaseError::CorruptRow(detail));

    let instruction = Instruction::from_json_str(&row.body)
        .map_err(|err| corrupt(format!("instruction {}: {err}", row.id)))?;
    let tags = load_tags(conn, &row.id)?
        .into_iter()
        .map(|tag| Identifier::try_new(tag).map_err(|err| corrupt(format!("tag: {err}"))))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InstructionDocument {
        id: InstructionId::try_new(row.id).map_err(|err| corrupt(format!("instruction id: {err}")))?,
        creator_id: AccountId::try_new(row.creator_id)
            .map_err(|err| corrupt(format!("creator id: {err}")))?,
        name: Identifier::try_new(row.name).map_err(|err| corrupt(format!("name: {err}")))?,
        tags,
        instruction,
    })
}

fn existing_id(
    conn: &Connection,
    creator_id: &AccountId,
    name: &Identifier,
) -> Result<Option<InstructionId>, StoreError> {
    let id = conn
        .query_row(
            "SELECT id FROM instructions WHERE creator_id=?1 AND name=?2",
            params![creator_id.as_str(), name.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    id.map(|id| {
        InstructionId::try_new(id)
            .map_err(|err| StoreError::Database(DatabaseError::CorruptRow(err.to_string())))
    })
    .transpose()
}

fn load_tags(conn: &Connection, instruction_id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT tag FROM instruction_tags WHERE instruction_id=?1 ORDER BY ordinal ASC",
    )?;
    let rows = stmt.query_map(params![instruction_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn replace_tags_tx(
    tx: &Transaction<'_>,
    instruction_id: &InstructionId,
    tags: &[Identifier],
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM instruction_tags WHERE instruction_id=?1",
        params![instruction_id.as_str()],
    )?;
    for (ordinal, tag) in tags.iter().enumerate() {
        let ordinal = i64::try_from(ordinal)
            .map_err(|_| StoreError::Database(DatabaseError::CorruptRow("tag ordinal overflow".to_string())))?;
        tx.execute(
            "INSERT INTO instruction_tags(instruction_id, ordinal, tag) VALUES (?1, ?2, ?3)",
            params![instruction_id.as_str(), ordinal, tag.as_str()],
        )?;
    }
    Ok(())
}
