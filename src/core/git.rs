use chrono::{DateTime, Utc};
use std::path::Path;

use crate::executor::{CommandRunner, CommandSpec, EchoPolicy, RunOptions};

// ============================================================================
// Image tag derivation
// ============================================================================

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn git_at(git: &str, root: &Path) -> CommandSpec {
    CommandSpec::new(git).arg("-C").arg(root.to_string_lossy())
}

/// Short commit id of `HEAD`, or `None` outside a repository.
pub fn short_head(runner: &dyn CommandRunner, git: &str, root: &Path) -> Option<String> {
    runner
        .run(
            &git_at(git, root).args(["rev-parse", "--short=12", "HEAD"]),
            RunOptions::captured(EchoPolicy::Never),
        )
        .ok()
        .map(|out| out.stdout.trim().to_string())
        .filter(|commit| !commit.is_empty())
}

/// True when either the index or the working tree differs from `HEAD`.
pub fn has_uncommitted_changes(runner: &dyn CommandRunner, git: &str, root: &Path) -> bool {
    let staged = ["diff", "--quiet", "--no-ext-diff", "--cached"];
    let unstaged = ["diff", "--quiet", "--no-ext-diff"];

    [&staged[..], &unstaged[..]].iter().any(|args| {
        runner
            .run(
                &git_at(git, root).args(args.iter().copied()),
                RunOptions::captured(EchoPolicy::Never).unchecked(),
            )
            .map(|out| !out.success())
            .unwrap_or(false)
    })
}

/// `<commit>-<UTC timestamp>[-dirty]`, or the bare timestamp when version
/// control metadata is unavailable.
pub fn derive_image_tag(
    runner: &dyn CommandRunner,
    git: &str,
    root: &Path,
    now: DateTime<Utc>,
) -> String {
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    match short_head(runner, git, root) {
        Some(commit) => {
            let suffix = if has_uncommitted_changes(runner, git, root) {
                "-dirty"
            } else {
                ""
            };
            format!("{}-{}{}", commit, timestamp, suffix)
        }
        None => timestamp,
    }
}
