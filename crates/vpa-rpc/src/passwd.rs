//! Password table.
//!
//! The table is a comma-separated file. The first three lines are the
//! meta header, meta data and column header rows; user rows start at
//! line 3, and a user's line number doubles as their credential handle.
//!
//! ```text
//! active,username,password,authlevel,firstname,lastname,descr
//! true,doug,melange,admin,Douglas,Goodall,Site owner
//! ```

use std::path::{Path, PathBuf};

use vpa_core::limits::{CRED_SLOTS, FIRST_HANDLE, NAME_SIZE};
use vpa_core::secret::fields_match;

use crate::error::{Result, RpcError};

mod col {
    pub const ACTIVE: usize = 0;
    pub const USERNAME: usize = 1;
    pub const PASSWORD: usize = 2;
    pub const AUTH_LEVEL: usize = 3;
    pub const FIRST_NAME: usize = 4;
    pub const LAST_NAME: usize = 5;
    pub const DESCR: usize = 6;
}

/// One user row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswdEntry {
    /// Line number in the table, also the credential handle
    pub row: usize,
    pub active: bool,
    pub username: String,
    pub password: String,
    pub auth_level: String,
    pub first_name: String,
    pub last_name: String,
    pub descr: String,
}

impl PasswdEntry {
    fn parse(row: usize, line: &str) -> Self {
        let cells: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
        let cell = |i: usize| cells.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
        Self {
            row,
            active: cell(col::ACTIVE) == "true",
            username: cell(col::USERNAME),
            password: cell(col::PASSWORD),
            auth_level: cell(col::AUTH_LEVEL),
            first_name: cell(col::FIRST_NAME),
            last_name: cell(col::LAST_NAME),
            descr: cell(col::DESCR),
        }
    }

    /// Whether this row admits `username` / `password`.
    pub fn admits(&self, username: &str, password: &str) -> bool {
        self.active && self.username == username && fields_match(&self.password, password, NAME_SIZE)
    }

    /// Handle for this row, if it fits in the credential table.
    pub fn handle(&self) -> Option<i32> {
        (FIRST_HANDLE..CRED_SLOTS)
            .contains(&self.row)
            .then_some(self.row as i32)
    }
}

/// Source of user rows for LOOKUP.
pub trait CredentialStore: Send + Sync {
    /// First active row matching the pair, or `None`.
    ///
    /// Errors mean the store itself could not be read.
    fn lookup(&self, username: &str, password: &str) -> Result<Option<PasswdEntry>>;
}

/// Reads the CSV file afresh on every lookup, so edits take effect
/// without restarting anything.
pub struct CsvCredentialStore {
    path: PathBuf,
}

impl CsvCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All user rows (line 3 onward), blank lines skipped.
    pub fn entries(&self) -> Result<Vec<PasswdEntry>> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| RpcError::CredentialStore {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_table(&text))
    }
}

impl CredentialStore for CsvCredentialStore {
    fn lookup(&self, username: &str, password: &str) -> Result<Option<PasswdEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.admits(username, password)))
    }
}

fn parse_table(text: &str) -> Vec<PasswdEntry> {
    text.lines()
        .enumerate()
        .skip(FIRST_HANDLE)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(row, line)| PasswdEntry::parse(row, line))
        .collect()
}

/// Fixed in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Vec<PasswdEntry>,
}

impl MemoryCredentialStore {
    pub fn new(entries: Vec<PasswdEntry>) -> Self {
        Self { entries }
    }

    /// Parse CSV text laid out like the password file.
    pub fn from_csv(text: &str) -> Self {
        Self::new(parse_table(text))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, username: &str, password: &str) -> Result<Option<PasswdEntry>> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.admits(username, password))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
meta,passwd
1,7
active,username,password,authlevel,firstname,lastname,descr
true,doug,melange,admin,Douglas,Goodall,Site owner
false,ghost,boo,user,Casper,Ghost,Disabled account
true,monk,chant,user,Brother,Monk,
";

    #[test]
    fn test_parse_rows_and_handles() {
        let store = MemoryCredentialStore::from_csv(SAMPLE);
        let doug = store.lookup("doug", "melange").unwrap().unwrap();
        assert_eq!(doug.row, 3);
        assert_eq!(doug.handle(), Some(3));
        assert_eq!(doug.first_name, "Douglas");
        assert_eq!(doug.auth_level, "admin");

        let monk = store.lookup("monk", "chant").unwrap().unwrap();
        assert_eq!(monk.handle(), Some(5));
        assert_eq!(monk.descr, "");
    }

    #[test]
    fn test_rejections() {
        let store = MemoryCredentialStore::from_csv(SAMPLE);
        assert!(store.lookup("doug", "wrong").unwrap().is_none());
        assert!(store.lookup("ghost", "boo").unwrap().is_none());
        assert!(store.lookup("nobody", "x").unwrap().is_none());
        // Header rows are never users
        assert!(store.lookup("username", "password").unwrap().is_none());
    }

    #[test]
    fn test_row_beyond_table_has_no_handle() {
        let e = PasswdEntry {
            row: CRED_SLOTS,
            ..Default::default()
        };
        assert_eq!(e.handle(), None);
    }

    #[test]
    fn test_csv_file_store() {
        let path = std::env::temp_dir().join(format!("vpa_passwd_{}.csv", std::process::id()));
        std::fs::write(&path, SAMPLE.replace('\n', "\r\n")).unwrap();

        let store = CsvCredentialStore::new(&path);
        let doug = store.lookup("doug", "melange").unwrap().unwrap();
        assert_eq!(doug.descr, "Site owner");
        assert_eq!(store.entries().unwrap().len(), 3);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            store.lookup("doug", "melange"),
            Err(RpcError::CredentialStore { .. })
        ));
    }
}
