use crate::connection::Storage;
use crate::error::Result;
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub folder_id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl Storage {
    pub fn upsert_folder(&self, folder: &Folder) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute(
            "INSERT INTO folders (folder_id, name, parent_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(folder_id) DO UPDATE SET name = excluded.name, parent_id = excluded.parent_id",
            params![folder.folder_id, folder.name, folder.parent_id],
        )?;
        Ok(())
    }

    pub fn get_folder(&self, folder_id: &str) -> Result<Option<Folder>> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.query_row(
            "SELECT folder_id, name, parent_id FROM folders WHERE folder_id = ?1",
            params![folder_id],
            |row| {
                Ok(Folder {
                    folder_id: row.get(0)?,
                    name: row.get(1)?,
                    parent_id: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_folder_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .upsert_folder(&Folder {
                folder_id: "d1".into(),
                name: "Reports".into(),
                parent_id: None,
            })
            .unwrap();
        let fetched = storage.get_folder("d1").unwrap().unwrap();
        assert_eq!(fetched.name, "Reports");
    }
}
