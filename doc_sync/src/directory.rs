//! Persistent user directory.
//!
//! Plain-text layout: the document path on line 1, the pinned owner row on
//! line 2, the count of additional users on line 3, then one row per user
//! (`name priority access pid`). Only the owner program mutates the file;
//! user programs refresh their own pid row at startup.

use crate::constants::{
    HIGH_TIME_ALLOCATION_SECS, LOW_TIME_ALLOCATION_SECS, MAX_USERS, OWNER_NAME,
    OWNER_TIME_ALLOCATION_SECS,
};
use crate::err::{CoordError, CoordErrorKind, Result};
use bitflags::bitflags;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern compiles"));

bitflags! {
    pub struct AccessMode: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

impl AccessMode {
    pub const READ_WRITE: AccessMode = AccessMode::from_bits_truncate(0b11);

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "READ" => Some(AccessMode::READ),
            "WRITE" => Some(AccessMode::WRITE),
            "READ_WRITE" => Some(AccessMode::READ_WRITE),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        if *self == AccessMode::READ_WRITE {
            "READ_WRITE"
        } else if self.contains(AccessMode::WRITE) {
            "WRITE"
        } else {
            "READ"
        }
    }

    pub fn can_read(&self) -> bool {
        self.contains(AccessMode::READ)
    }

    pub fn can_write(&self) -> bool {
        self.contains(AccessMode::WRITE)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityClass {
    Owner,
    High,
    Low,
}

impl PriorityClass {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "OWNER" => Some(PriorityClass::Owner),
            "HIGH" => Some(PriorityClass::High),
            "LOW" => Some(PriorityClass::Low),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            PriorityClass::Owner => "OWNER",
            PriorityClass::High => "HIGH",
            PriorityClass::Low => "LOW",
        }
    }

    /// Writer session budget granted after admission.
    pub fn time_allocation_secs(&self) -> u32 {
        match self {
            PriorityClass::Owner => OWNER_TIME_ALLOCATION_SECS,
            PriorityClass::High => HIGH_TIME_ALLOCATION_SECS,
            PriorityClass::Low => LOW_TIME_ALLOCATION_SECS,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub name: String,
    pub priority: PriorityClass,
    pub access: AccessMode,
    pub pid: i32,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, priority: PriorityClass, access: AccessMode) -> Self {
        Self {
            name: name.into(),
            priority,
            access,
            pid: 0,
        }
    }

    pub fn owner_row(pid: i32) -> Self {
        Self {
            name: OWNER_NAME.to_string(),
            priority: PriorityClass::Owner,
            access: AccessMode::READ_WRITE,
            pid,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.priority == PriorityClass::Owner
    }

    fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let name = fields.next()?.to_string();
        let priority = PriorityClass::parse(fields.next()?)?;
        let access = AccessMode::parse(fields.next()?)?;
        let pid = fields.next()?.parse::<i32>().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            name,
            priority,
            access,
            pid,
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name,
            self.priority.token(),
            self.access.token(),
            self.pid
        )
    }
}

#[derive(Debug)]
pub struct Directory {
    document_path: String,
    owner: UserRecord,
    users: Vec<UserRecord>,
}

#[track_caller]
fn invalid(detail: impl Into<String>) -> crate::err::Error {
    CoordError::boxed(CoordErrorKind::DirectoryInvalid, detail)
}

#[track_caller]
fn rejected(detail: impl Into<String>) -> crate::err::Error {
    CoordError::boxed(CoordErrorKind::InvalidInput, detail)
}

impl Directory {
    /// A fresh directory holding only the admin row.
    pub fn bootstrap(document_path: impl Into<String>, owner_pid: i32) -> Self {
        Self {
            document_path: document_path.into(),
            owner: UserRecord::owner_row(owner_pid),
            users: Vec::new(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| invalid(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let document_path = lines
            .next()
            .ok_or_else(|| invalid("missing document path line"))?
            .trim()
            .to_string();
        if document_path.is_empty() {
            return Err(invalid("empty document path line"));
        }

        let owner_line = lines.next().ok_or_else(|| invalid("missing owner row"))?;
        let mut owner = UserRecord::parse_line(owner_line)
            .ok_or_else(|| invalid(format!("malformed owner row: {:?}", owner_line)))?;
        // The admin row is pinned whatever the file claims.
        owner.priority = PriorityClass::Owner;
        owner.access = AccessMode::READ_WRITE;

        let count_line = lines.next().ok_or_else(|| invalid("missing user count"))?;
        let count: usize = count_line
            .trim()
            .parse()
            .map_err(|_| invalid(format!("malformed user count: {:?}", count_line)))?;
        if count > MAX_USERS - 1 {
            return Err(invalid(format!("user count {} exceeds capacity", count)));
        }

        let mut users = Vec::with_capacity(count);
        for i in 0..count {
            let line = lines
                .next()
                .ok_or_else(|| invalid(format!("expected {} user rows, found {}", count, i)))?;
            let rec = UserRecord::parse_line(line)
                .ok_or_else(|| invalid(format!("malformed user row: {:?}", line)))?;
            if rec.priority == PriorityClass::Owner {
                return Err(invalid(format!("duplicate owner row: {}", rec.name)));
            }
            users.push(rec);
        }

        Ok(Self {
            document_path,
            owner,
            users,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.render())?;
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.document_path);
        out.push('\n');
        // Re-pin the admin row on every save.
        let mut owner = self.owner.clone();
        owner.priority = PriorityClass::Owner;
        owner.access = AccessMode::READ_WRITE;
        out.push_str(&owner.to_line());
        out.push('\n');
        out.push_str(&self.users.len().to_string());
        out.push('\n');
        for user in &self.users {
            out.push_str(&user.to_line());
            out.push('\n');
        }
        out
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub fn owner(&self) -> &UserRecord {
        &self.owner
    }

    pub fn set_owner_pid(&mut self, pid: i32) {
        self.owner.pid = pid;
    }

    pub fn len(&self) -> usize {
        self.users.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false // the owner row is always present
    }

    pub fn is_full(&self) -> bool {
        self.len() >= MAX_USERS
    }

    pub fn lookup(&self, name: &str) -> Option<&UserRecord> {
        if name == self.owner.name {
            return Some(&self.owner);
        }
        self.users.iter().find(|u| u.name == name)
    }

    /// Owner-first iteration for listings.
    pub fn iter(&self) -> impl Iterator<Item = &UserRecord> {
        std::iter::once(&self.owner).chain(self.users.iter())
    }

    pub fn add(&mut self, rec: UserRecord) -> Result<()> {
        if !NAME_PATTERN.is_match(&rec.name) {
            return Err(rejected(format!("invalid user name: {:?}", rec.name)));
        }
        if rec.priority == PriorityClass::Owner {
            return Err(rejected("only the admin row may carry OWNER priority"));
        }
        if self.lookup(&rec.name).is_some() {
            return Err(rejected(format!("user '{}' already exists", rec.name)));
        }
        if self.is_full() {
            return Err(rejected(format!("directory is full ({} users)", MAX_USERS)));
        }
        self.users.push(rec);
        Ok(())
    }

    /// Remove a user row and hand it back so the caller can signal a live
    /// process. The admin row cannot be removed.
    pub fn remove(&mut self, name: &str) -> Result<UserRecord> {
        if name == self.owner.name {
            return Err(CoordError::boxed(
                CoordErrorKind::PermissionDenied,
                "the admin user cannot be removed",
            ));
        }
        match self.users.iter().position(|u| u.name == name) {
            Some(idx) => Ok(self.users.remove(idx)),
            None => Err(rejected(format!("user '{}' not found", name))),
        }
    }

    pub fn update(
        &mut self,
        name: &str,
        priority: PriorityClass,
        access: AccessMode,
    ) -> Result<()> {
        if name == self.owner.name {
            return Err(CoordError::boxed(
                CoordErrorKind::PermissionDenied,
                "the admin user cannot be modified",
            ));
        }
        if priority == PriorityClass::Owner {
            return Err(rejected("only the admin row may carry OWNER priority"));
        }
        match self.users.iter_mut().find(|u| u.name == name) {
            Some(rec) => {
                rec.priority = priority;
                rec.access = access;
                Ok(())
            }
            None => Err(rejected(format!("user '{}' not found", name))),
        }
    }

    /// Record the pid a participant is currently running under.
    pub fn set_pid(&mut self, name: &str, pid: i32) -> bool {
        if name == self.owner.name {
            self.owner.pid = pid;
            return true;
        }
        match self.users.iter_mut().find(|u| u.name == name) {
            Some(rec) => {
                rec.pid = pid;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::error_kind;

    fn sample() -> Directory {
        let mut dir = Directory::bootstrap("/tmp/doc.txt", 100);
        dir.add(UserRecord::new(
            "alice",
            PriorityClass::High,
            AccessMode::READ_WRITE,
        ))
        .unwrap();
        dir.add(UserRecord::new("bob", PriorityClass::Low, AccessMode::READ))
            .unwrap();
        dir
    }

    #[test]
    fn render_parse_round_trip() {
        let dir = sample();
        let text = dir.render();
        let reparsed = Directory::parse(&text).expect("parse rendered directory");
        assert_eq!(reparsed.document_path(), "/tmp/doc.txt");
        assert_eq!(reparsed.len(), 3);
        let alice = reparsed.lookup("alice").expect("alice present");
        assert_eq!(alice.priority, PriorityClass::High);
        assert_eq!(alice.access, AccessMode::READ_WRITE);
        let bob = reparsed.lookup("bob").expect("bob present");
        assert_eq!(bob.access, AccessMode::READ);
    }

    #[test]
    fn owner_row_is_pinned_on_parse_and_save() {
        // A tampered file claiming the admin is LOW/READ gets repaired.
        let text = "/tmp/doc.txt\nadmin LOW READ 42\n0\n";
        let dir = Directory::parse(text).expect("parse");
        assert_eq!(dir.owner().priority, PriorityClass::Owner);
        assert_eq!(dir.owner().access, AccessMode::READ_WRITE);
        assert!(dir.render().contains("admin OWNER READ_WRITE 42"));
    }

    #[test]
    fn owner_cannot_be_removed_or_updated() {
        let mut dir = sample();
        let err = dir.remove("admin").expect_err("remove refused");
        assert_eq!(error_kind(&err), Some(CoordErrorKind::PermissionDenied));
        let err = dir
            .update("admin", PriorityClass::Low, AccessMode::READ)
            .expect_err("update refused");
        assert_eq!(error_kind(&err), Some(CoordErrorKind::PermissionDenied));
        assert_eq!(dir.owner().priority, PriorityClass::Owner);
        assert!(dir.lookup("admin").is_some());
    }

    #[test]
    fn add_rejects_duplicates_bad_names_and_owner_priority() {
        let mut dir = sample();
        assert!(
            dir.add(UserRecord::new(
                "alice",
                PriorityClass::Low,
                AccessMode::READ
            ))
            .is_err()
        );
        assert!(
            dir.add(UserRecord::new(
                "not a name",
                PriorityClass::Low,
                AccessMode::READ
            ))
            .is_err()
        );
        assert!(
            dir.add(UserRecord::new(
                "mallory",
                PriorityClass::Owner,
                AccessMode::READ_WRITE
            ))
            .is_err()
        );
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn full_directory_rejects_additions_unchanged() {
        let mut dir = Directory::bootstrap("/tmp/doc.txt", 1);
        for i in 0..(MAX_USERS - 1) {
            dir.add(UserRecord::new(
                format!("user{}", i),
                PriorityClass::Low,
                AccessMode::READ,
            ))
            .expect("fits");
        }
        assert!(dir.is_full());
        let before = dir.render();
        assert!(
            dir.add(UserRecord::new(
                "overflow",
                PriorityClass::Low,
                AccessMode::READ
            ))
            .is_err()
        );
        assert_eq!(dir.render(), before);
    }

    #[test]
    fn malformed_files_report_directory_invalid() {
        for text in [
            "",
            "/tmp/doc.txt\n",
            "/tmp/doc.txt\nadmin OWNER READ_WRITE 1\n",
            "/tmp/doc.txt\nadmin OWNER READ_WRITE 1\ntwo\n",
            "/tmp/doc.txt\nadmin OWNER READ_WRITE 1\n2\nalice HIGH READ 0\n",
            "/tmp/doc.txt\nadmin OWNER READ_WRITE 1\n1\nalice SUPER READ 0\n",
            "/tmp/doc.txt\nadmin OWNER READ_WRITE 1\n1\neve OWNER READ_WRITE 0\n",
        ] {
            let err = Directory::parse(text).expect_err("should reject");
            assert_eq!(
                error_kind(&err),
                Some(CoordErrorKind::DirectoryInvalid),
                "text: {:?}",
                text
            );
        }
    }

    #[test]
    fn access_mode_tokens_and_checks() {
        assert_eq!(AccessMode::parse("READ"), Some(AccessMode::READ));
        assert_eq!(AccessMode::parse("READ_WRITE"), Some(AccessMode::READ_WRITE));
        assert_eq!(AccessMode::parse("rw"), None);
        assert!(AccessMode::READ.can_read());
        assert!(!AccessMode::READ.can_write());
        assert!(AccessMode::READ_WRITE.can_write());
        assert_eq!(AccessMode::WRITE.token(), "WRITE");
    }

    #[test]
    fn priority_budgets_match_classes() {
        assert_eq!(PriorityClass::Owner.time_allocation_secs(), 30);
        assert_eq!(PriorityClass::High.time_allocation_secs(), 10);
        assert_eq!(PriorityClass::Low.time_allocation_secs(), 15);
    }

    #[test]
    fn set_pid_targets_existing_rows() {
        let mut dir = sample();
        assert!(dir.set_pid("bob", 777));
        assert_eq!(dir.lookup("bob").unwrap().pid, 777);
        assert!(!dir.set_pid("ghost", 1));
    }
}
