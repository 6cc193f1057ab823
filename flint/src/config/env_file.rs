//! Order-preserving model of a `.env` file.
//!
//! Values are resolved with `dotenvy`, including `${VAR}` expansion. The
//! line ledger kept here only serves writes: comments, blank lines,
//! unrecognised lines and untouched entries are written back byte for byte,
//! line terminators included.

use crate::utils::errors::{FlintError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Blank line, comment, or anything that is not `KEY=VALUE`.
    Verbatim,
    Entry { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    kind: Kind,
    /// Line content without its terminator.
    text: String,
    /// `"\n"`, `"\r\n"`, or empty for a last line without newline.
    eol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
}

impl EnvFile {
    pub fn parse(text: &str) -> Self {
        let lines = text.split_inclusive('\n').map(parse_line).collect();
        Self { lines }
    }

    /// Read `path`; a missing file is an empty `EnvFile`.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(FlintError::Filesystem {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string()).map_err(|source| FlintError::Filesystem {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every resolved value. Later assignments override earlier ones and
    /// unparsable lines are skipped.
    pub fn values(&self) -> HashMap<String, String> {
        let text = self.to_string();
        dotenvy::from_read_iter(text.as_bytes()).flatten().collect()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values().remove(key)
    }

    /// Update `key` in place, or append it when absent.
    ///
    /// The last assignment of `key` is the one rewritten. Setting a key to
    /// the value it already resolves to leaves the file untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !is_valid_key(key) {
            return Err(FlintError::Config(format!("invalid key: {:?}", key)));
        }
        if self.get(key).as_deref() == Some(value) {
            return Ok(());
        }

        let assignment = format!("{}={}", key, quote_value(value));
        let existing = self
            .lines
            .iter_mut()
            .rev()
            .find(|line| matches!(&line.kind, Kind::Entry { key: k } if k == key));

        match existing {
            Some(line) => {
                line.text = if line.text.trim_start().starts_with("export ") {
                    format!("export {}", assignment)
                } else {
                    assignment
                };
            }
            None => {
                let eol = self.newline().to_string();
                if let Some(last) = self.lines.last_mut() {
                    if last.eol.is_empty() {
                        last.eol = eol.clone();
                    }
                }
                self.lines.push(Line {
                    kind: Kind::Entry { key: key.to_string() },
                    text: assignment,
                    eol,
                });
            }
        }
        Ok(())
    }

    /// Drop every assignment of `key`. Returns whether any existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(&line.kind, Kind::Entry { key: k } if k == key));
        self.lines.len() != before
    }

    /// Keys in order of first appearance.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for line in &self.lines {
            if let Kind::Entry { key } = &line.kind {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Terminator used by the file, `"\n"` when it has none yet.
    fn newline(&self) -> &str {
        self.lines
            .iter()
            .map(|line| line.eol.as_str())
            .find(|eol| !eol.is_empty())
            .unwrap_or("\n")
    }
}

impl fmt::Display for EnvFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            write!(f, "{}{}", line.text, line.eol)?;
        }
        Ok(())
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_line(raw: &str) -> Line {
    let (text, eol) = if let Some(text) = raw.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = raw.strip_suffix('\n') {
        (text, "\n")
    } else {
        (raw, "")
    };

    let body = text.trim_start();
    let body = body.strip_prefix("export ").unwrap_or(body);
    let kind = match body.split_once('=') {
        Some((key, _)) if !body.starts_with('#') && is_valid_key(key.trim()) => Kind::Entry {
            key: key.trim().to_string(),
        },
        _ => Kind::Verbatim,
    };

    Line {
        kind,
        text: text.to_string(),
        eol: eol.to_string(),
    }
}

/// Render `value` so that dotenvy reads it back unchanged.
fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# Media stack settings
PUID=1000
PGID=1000

# Where archives go
BACKUP_DIR=/srv/backups   # nightly
export TZ='Europe/Lisbon'
MOTD=\"hello world\"
not a setting
";

    #[test]
    fn test_parse_values() {
        let env = EnvFile::parse(SAMPLE);
        assert_eq!(env.get("PUID").as_deref(), Some("1000"));
        assert_eq!(env.get("BACKUP_DIR").as_deref(), Some("/srv/backups"));
        assert_eq!(env.get("TZ").as_deref(), Some("Europe/Lisbon"));
        assert_eq!(env.get("MOTD").as_deref(), Some("hello world"));
        assert_eq!(env.get("missing"), None);
        assert_eq!(env.keys(), vec!["PUID", "PGID", "BACKUP_DIR", "TZ", "MOTD"]);
    }

    #[test]
    fn test_references_are_expanded() {
        let env = EnvFile::parse("FLINT_TEST_BASE=/srv\nBACKUP_DIR=${FLINT_TEST_BASE}/backups\nLOGS=$FLINT_TEST_BASE/logs\n");
        assert_eq!(env.get("BACKUP_DIR").as_deref(), Some("/srv/backups"));
        assert_eq!(env.get("LOGS").as_deref(), Some("/srv/logs"));
    }

    #[test]
    fn test_unmodified_round_trip_is_identical() {
        assert_eq!(EnvFile::parse(SAMPLE).to_string(), SAMPLE);
        assert_eq!(EnvFile::parse("A=1\nB=2").to_string(), "A=1\nB=2");
        assert_eq!(EnvFile::parse("").to_string(), "");
    }

    #[test]
    fn test_crlf_lines_keep_their_terminators() {
        let mut env = EnvFile::parse("# c\r\nA=1\r\nB=2\r\n");
        env.set("B", "3").unwrap();
        assert_eq!(env.to_string(), "# c\r\nA=1\r\nB=3\r\n");

        env.set("C", "4").unwrap();
        assert_eq!(env.to_string(), "# c\r\nA=1\r\nB=3\r\nC=4\r\n");
    }

    #[test]
    fn test_append_after_missing_final_newline() {
        let mut env = EnvFile::parse("A=1\nB=2");
        env.set("C", "3").unwrap();
        assert_eq!(env.to_string(), "A=1\nB=2\nC=3\n");
    }

    #[test]
    fn test_set_existing_key_rewrites_in_place() {
        let mut env = EnvFile::parse(SAMPLE);
        env.set("PGID", "2000").unwrap();
        let out = env.to_string();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[2], "PGID=2000");
        assert_eq!(lines[0], "# Media stack settings");
        assert_eq!(lines[5], "BACKUP_DIR=/srv/backups   # nightly");
        assert_eq!(lines.len(), SAMPLE.lines().count());
    }

    #[test]
    fn test_set_keeps_export_prefix() {
        let mut env = EnvFile::parse(SAMPLE);
        env.set("TZ", "UTC").unwrap();
        assert!(env.to_string().contains("\nexport TZ=UTC\n"));
        assert_eq!(env.get("TZ").as_deref(), Some("UTC"));
    }

    #[test]
    fn test_set_same_value_keeps_original_text() {
        let mut env = EnvFile::parse(SAMPLE);
        env.set("TZ", "Europe/Lisbon").unwrap();
        assert_eq!(env.to_string(), SAMPLE);
    }

    #[test]
    fn test_set_new_key_appends_and_quotes() {
        let mut env = EnvFile::parse("A=1\n");
        env.set("GREETING", "two words").unwrap();
        env.set("PATHLIKE", "/opt/x").unwrap();
        assert_eq!(env.to_string(), "A=1\nGREETING=\"two words\"\nPATHLIKE=/opt/x\n");

        let reparsed = EnvFile::parse(&env.to_string());
        assert_eq!(reparsed.get("GREETING").as_deref(), Some("two words"));
    }

    #[test]
    fn test_set_rejects_invalid_keys() {
        let mut env = EnvFile::parse("A=1\n");
        for bad in ["MY KEY", "", "1ABC", "A=B"] {
            let err = env.set(bad, "v").unwrap_err();
            assert!(matches!(err, FlintError::Config(_)), "{:?} should be rejected", bad);
        }
        assert_eq!(env.to_string(), "A=1\n");
    }

    #[test]
    fn test_last_assignment_wins() {
        let mut env = EnvFile::parse("K=first\nK=second\n");
        assert_eq!(env.get("K").as_deref(), Some("second"));
        env.set("K", "third").unwrap();
        assert_eq!(env.to_string(), "K=first\nK=third\n");
        assert!(env.remove("K"));
        assert_eq!(env.get("K"), None);
        assert!(!env.remove("K"));
    }

    #[test]
    fn test_special_characters_round_trip() {
        let mut env = EnvFile::default();
        env.set("TRICKY", r#"say "hi" \ bye"#).unwrap();
        env.set("LITERAL", "cost $5 # each").unwrap();

        let reparsed = EnvFile::parse(&env.to_string());
        assert_eq!(reparsed.get("TRICKY").as_deref(), Some(r#"say "hi" \ bye"#));
        assert_eq!(reparsed.get("LITERAL").as_deref(), Some("cost $5 # each"));
    }

    #[test]
    fn test_load_and_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");

        let mut env = EnvFile::load(&path).unwrap();
        assert!(env.keys().is_empty());

        env.set("BACKUP_DIR", "/mnt/backups").unwrap();
        env.save(&path).unwrap();
        assert_eq!(EnvFile::load(&path).unwrap().get("BACKUP_DIR").as_deref(), Some("/mnt/backups"));
    }
}
