//! Commit objects and the options used to create them.
//!
//! A commit is stored as UTF-8 text:
//!
//! ```text
//! tree <tree-hex>
//! parent <parent-hex>          (zero or more, in order)
//! author <name> <<email>> <unix-seconds> <+HHMM>
//! committer <name> <<email>> <unix-seconds> <+HHMM>
//!
//! <message>
//! ```

use crate::error::{Error, Result};
use crate::hash::Hash;
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use std::fmt::Write;

/// Who made a change, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    /// Signature stamped with the current local time.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_time(name, email, Local::now().fixed_offset())
    }

    /// Signature with an explicit timestamp.
    pub fn with_time(
        name: impl Into<String>,
        email: impl Into<String>,
        when: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// Parse the `Name <email>` form used on the command line.
    pub fn parse_identity(s: &str) -> Result<Self> {
        let (name, rest) = s.split_once('<').ok_or_else(|| {
            Error::invalid_commit_options(format!("Expected 'Name <email>', got {:?}", s))
        })?;
        let email = rest.strip_suffix('>').ok_or_else(|| {
            Error::invalid_commit_options(format!("Unterminated email in {:?}", s))
        })?;
        let sig = Self::new(name.trim(), email.trim());
        sig.validate("identity")?;
        Ok(sig)
    }

    fn validate(&self, role: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_commit_options(format!("{} name is empty", role)));
        }
        let forbidden = |s: &str| s.contains(['<', '>', '\n']);
        if forbidden(&self.name) || forbidden(&self.email) {
            return Err(Error::invalid_commit_options(format!(
                "{} contains '<', '>' or a newline",
                role
            )));
        }
        Ok(())
    }

    fn encode(&self) -> String {
        let offset = self.when.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.abs();
        format!(
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.when.timestamp(),
            sign,
            offset / 3600,
            offset % 3600 / 60
        )
    }

    fn decode(line: &str) -> Result<Self> {
        let (name, rest) = line
            .split_once(" <")
            .ok_or_else(|| Error::invalid_commit(format!("Malformed signature: {:?}", line)))?;
        let (email, rest) = rest
            .split_once("> ")
            .ok_or_else(|| Error::invalid_commit(format!("Malformed signature: {:?}", line)))?;
        let (seconds, tz) = rest
            .split_once(' ')
            .ok_or_else(|| Error::invalid_commit(format!("Missing timezone: {:?}", line)))?;

        let seconds: i64 = seconds
            .parse()
            .map_err(|_| Error::invalid_commit(format!("Invalid timestamp: {:?}", seconds)))?;
        let offset = parse_tz(tz)?;
        let when = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::invalid_commit(format!("Timestamp out of range: {}", seconds)))?;

        Ok(Self::with_time(name, email, when))
    }
}

fn parse_tz(tz: &str) -> Result<FixedOffset> {
    let invalid = || Error::invalid_commit(format!("Invalid timezone: {:?}", tz));
    if tz.len() != 5 || !tz.is_ascii() || !tz[1..].bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let sign = match &tz[..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(invalid()),
    };
    let hours: i32 = tz[1..3].parse().map_err(|_| invalid())?;
    let minutes: i32 = tz[3..5].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// A decoded commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    /// Encode to the stored text form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "tree {}", self.tree);
        for parent in &self.parents {
            let _ = writeln!(out, "parent {}", parent);
        }
        let _ = writeln!(out, "author {}", self.author.encode());
        let _ = writeln!(out, "committer {}", self.committer.encode());
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// Decode the stored text form.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::invalid_commit(format!("Commit is not UTF-8: {}", e)))?;
        let (headers, message) = text
            .split_once("\n\n")
            .ok_or_else(|| Error::invalid_commit("Missing blank line before message"))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| Error::invalid_commit(format!("Malformed header: {:?}", line)))?;
            match key {
                "tree" if tree.is_none() => tree = Some(Hash::from_hex(value)?),
                "parent" => parents.push(Hash::from_hex(value)?),
                "author" if author.is_none() => author = Some(Signature::decode(value)?),
                "committer" if committer.is_none() => {
                    committer = Some(Signature::decode(value)?)
                }
                _ => {
                    return Err(Error::invalid_commit(format!(
                        "Unexpected header: {:?}",
                        key
                    )));
                }
            }
        }

        Ok(Self {
            tree: tree.ok_or_else(|| Error::invalid_commit("Missing tree header"))?,
            parents,
            author: author.ok_or_else(|| Error::invalid_commit("Missing author header"))?,
            committer: committer
                .ok_or_else(|| Error::invalid_commit("Missing committer header"))?,
            message: message.to_string(),
        })
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Options for creating a commit.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Author of the change. Required.
    pub author: Option<Signature>,
    /// Who recorded the change. Required.
    pub committer: Option<Signature>,
    /// Parent commits, in order; empty for a root commit.
    pub parents: Vec<Hash>,
    /// Stage modified and deleted tracked files before committing.
    pub all: bool,
}

impl CommitOptions {
    /// Options with the same signature as author and committer.
    pub fn signed(signature: Signature) -> Self {
        Self {
            author: Some(signature.clone()),
            committer: Some(signature),
            ..Self::default()
        }
    }

    /// Set the parent list.
    pub fn with_parents(mut self, parents: Vec<Hash>) -> Self {
        self.parents = parents;
        self
    }

    /// Check that author and committer are present and encodable.
    pub fn validate(&self) -> Result<()> {
        let author = self
            .author
            .as_ref()
            .ok_or_else(|| Error::invalid_commit_options("author is missing"))?;
        let committer = self
            .committer
            .as_ref()
            .ok_or_else(|| Error::invalid_commit_options("committer is missing"))?;
        author.validate("author")?;
        committer.validate("committer")?;
        Ok(())
    }

    /// Build the commit record for `tree` and `message`.
    pub fn to_commit(&self, message: &str, tree: Hash) -> Result<Commit> {
        self.validate()?;
        let (Some(author), Some(committer)) = (&self.author, &self.committer) else {
            return Err(Error::invalid_commit_options("author or committer is missing"));
        };
        Ok(Commit {
            tree,
            parents: self.parents.clone(),
            author: author.clone(),
            committer: committer.clone(),
            message: message.to_string(),
        })
    }
}
