//! Scalar upserts into Terraform variable files.
//!
//! Only top-level `key = value` lines are recognized. Everything else (blocks,
//! lists, heredocs, comments) passes through untouched. No state is kept between
//! calls: each write re-reads, patches, and rewrites the whole file.

use std::path::Path;

use crate::error::Result;
use crate::utils::io;

/// Left-hand side of an assignment line, or `None` for blanks, comments and
/// lines without `=`.
fn assignment_key(line: &str) -> Option<&str> {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with("//") {
        return None;
    }
    stripped.split_once('=').map(|(lhs, _)| lhs.trim())
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Set `key = "value"`, rewriting the first existing assignment in place
/// (indentation kept) or appending one. Trailing blank lines are dropped and
/// the result ends with exactly one newline, `\r\n` when the input used it.
///
/// Duplicate assignments after the first are left as they are.
pub fn upsert(text: &str, key: &str, value: &str) -> String {
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let new_line = format!("{} = {}", key, quote(value));
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    match lines.iter().position(|line| assignment_key(line) == Some(key)) {
        Some(idx) => {
            let line = &lines[idx];
            let indent = &line[..line.len() - line.trim_start().len()];
            lines[idx] = format!("{}{}", indent, new_line);
        }
        None => lines.push(new_line),
    }

    let mut updated = lines.join(newline);
    updated.push_str(newline);
    updated
}

/// Apply several upserts in order.
pub fn upsert_all<K: AsRef<str>, V: AsRef<str>>(text: &str, updates: &[(K, V)]) -> String {
    updates.iter().fold(text.to_string(), |acc, (key, value)| {
        upsert(&acc, key.as_ref(), value.as_ref())
    })
}

/// Read the scalar assigned to `key` by its first assignment line.
///
/// Quoted strings are unescaped; bare values are returned up to a trailing
/// comment. Empty values read as `None`.
pub fn lookup(text: &str, key: &str) -> Option<String> {
    let line = text.lines().find(|line| assignment_key(line) == Some(key))?;
    let (_, rhs) = line.split_once('=')?;
    let rhs = rhs.trim();

    let value = match rhs.strip_prefix('"') {
        Some(rest) => unquote(rest)?,
        None => rhs
            .split(['#'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
    };

    (!value.is_empty()).then_some(value)
}

/// Consume a quoted string body up to its closing quote.
fn unquote(body: &str) -> Option<String> {
    let mut value = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            _ => value.push(c),
        }
    }
    None
}

/// Read a variable file (missing reads as empty), apply upserts, write it back.
pub fn update_file<K: AsRef<str>, V: AsRef<str>>(path: &Path, updates: &[(K, V)]) -> Result<()> {
    let content = io::read_file_or_empty(path, "read variable file")?;
    let updated = upsert_all(&content, updates);
    io::write_file_atomic(path, &updated, "write variable file")
}

/// Read a single scalar from a variable file on disk.
pub fn lookup_file(path: &Path, key: &str) -> Result<Option<String>> {
    let content = io::read_file_or_empty(path, "read variable file")?;
    Ok(lookup(&content, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# Workload settings
location = "westeurope"

tags = {
  owner = "platform"
}
  container_image = "old"
allowed_ips = ["10.0.0.1"]
"#;

    fn assignment_count(text: &str, key: &str) -> usize {
        text.lines().filter(|l| assignment_key(l) == Some(key)).count()
    }

    #[test]
    fn replaces_in_place_and_keeps_indentation() {
        let updated = upsert(SAMPLE, "container_image", "acr.io/app:1");
        assert!(updated.contains("\n  container_image = \"acr.io/app:1\"\n"));
        assert_eq!(updated.lines().count(), SAMPLE.lines().count());
    }

    #[test]
    fn second_upsert_fully_supersedes_first() {
        let once = upsert(SAMPLE, "subscription_id", "aaa");
        let twice = upsert(&once, "subscription_id", "bbb");

        assert_eq!(assignment_count(&twice, "subscription_id"), 1);
        assert_eq!(lookup(&twice, "subscription_id").as_deref(), Some("bbb"));

        let unrelated: Vec<&str> = twice
            .lines()
            .filter(|l| assignment_key(l) != Some("subscription_id"))
            .collect();
        assert_eq!(unrelated, SAMPLE.lines().collect::<Vec<_>>());
    }

    #[test]
    fn appends_missing_key_with_single_trailing_newline() {
        let without_newline = "a = \"1\"";
        let updated = upsert(without_newline, "b", "2");
        assert_eq!(updated, "a = \"1\"\nb = \"2\"\n");

        let with_newline = "a = \"1\"\n";
        assert_eq!(upsert(with_newline, "b", "2"), "a = \"1\"\nb = \"2\"\n");
    }

    #[test]
    fn empty_text_gets_one_line() {
        assert_eq!(upsert("", "environment_code", "dev"), "environment_code = \"dev\"\n");
    }

    #[test]
    fn comments_and_blank_lines_never_match() {
        let text = "# tenant_id = \"commented\"\n\n// tenant_id = \"also\"\ntenant_id_suffix = \"x\"\n";
        let updated = upsert(text, "tenant_id", "t-1");
        assert!(updated.starts_with(text));
        assert!(updated.ends_with("tenant_id = \"t-1\"\n"));
    }

    #[test]
    fn only_first_duplicate_is_rewritten() {
        let text = "key = \"a\"\nother = \"x\"\nkey = \"b\"\n";
        let updated = upsert(text, "key", "c");
        assert_eq!(updated, "key = \"c\"\nother = \"x\"\nkey = \"b\"\n");
    }

    #[test]
    fn nested_block_keys_with_same_name_are_matched_by_trimmed_lhs() {
        // Indented lines are still top-level from this patcher's point of view.
        let text = "tags = {\n  owner = \"a\"\n}\n";
        let updated = upsert(text, "owner", "b");
        assert_eq!(updated, "tags = {\n  owner = \"b\"\n}\n");
    }

    #[test]
    fn blank_lines_inside_text_survive_but_trailing_ones_collapse() {
        let text = "a = \"1\"\n\n\nb = \"2\"\n\n";
        let updated = upsert(text, "a", "9");
        assert_eq!(updated, "a = \"9\"\n\n\nb = \"2\"\n");
    }

    #[test]
    fn extra_trailing_newlines_collapse_when_key_exists() {
        assert_eq!(upsert("a = \"1\"\n\n\n", "a", "9"), "a = \"9\"\n");
        assert_eq!(upsert("a = \"1\"\n\n\n", "b", "2"), "a = \"1\"\nb = \"2\"\n");
        assert_eq!(upsert("\n\n", "a", "1"), "a = \"1\"\n");
    }

    #[test]
    fn crlf_line_endings_are_kept() {
        let text = "# header\r\na = \"1\"\r\nb = \"2\"\r\n\r\n";
        assert_eq!(
            upsert(text, "a", "9"),
            "# header\r\na = \"9\"\r\nb = \"2\"\r\n"
        );
        assert_eq!(upsert(text, "c", "3").matches("\r\n").count(), 4);
    }

    #[test]
    fn values_are_escaped_and_read_back() {
        let updated = upsert("", "note", r#"say "hi" \o/"#);
        assert_eq!(updated, "note = \"say \\\"hi\\\" \\\\o/\"\n");
        assert_eq!(lookup(&updated, "note").as_deref(), Some(r#"say "hi" \o/"#));
    }

    #[test]
    fn lookup_reads_bare_and_quoted_values() {
        let text = "count = 3 # instances\nname = \"reader\" # trailing\nempty = \"\"\n";
        assert_eq!(lookup(text, "count").as_deref(), Some("3"));
        assert_eq!(lookup(text, "name").as_deref(), Some("reader"));
        assert_eq!(lookup(text, "empty"), None);
        assert_eq!(lookup(text, "missing"), None);
    }

    #[test]
    fn upsert_all_applies_in_order() {
        let updated = upsert_all("", &[("a", "1"), ("b", "2"), ("a", "3")]);
        assert_eq!(updated, "a = \"3\"\nb = \"2\"\n");
    }

    #[test]
    fn update_file_creates_and_patches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.tfvars");

        update_file(&path, &[("registry_login_server", "myacr.azurecr.io")]).unwrap();
        update_file(&path, &[("container_image", "myacr.azurecr.io/app:1")]).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "registry_login_server = \"myacr.azurecr.io\"\ncontainer_image = \"myacr.azurecr.io/app:1\"\n"
        );
        assert_eq!(
            lookup_file(&path, "registry_login_server").unwrap().as_deref(),
            Some("myacr.azurecr.io")
        );
    }
}
