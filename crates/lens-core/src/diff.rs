//! Parses unified diff text into per-file hunk structures, and `--stat`
//! summaries into a totals report.

use crate::types::{DiffFile, DiffHunk, DiffSummary, HunkKind, LineNumber};

/// Splits unified diff output into files and typed hunk lines. Blank lines
/// and per-file metadata (index, mode, `---`/`+++` markers) are dropped.
pub fn parse_diff(diff: &str) -> Vec<DiffFile> {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut in_hunk = false;
    let mut old_line: u32 = 0;
    let mut new_line: u32 = 0;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let file = rest
                .split_once(" b/")
                .map(|(_, path)| path.to_string())
                .unwrap_or_else(|| rest.to_string());
            files.push(DiffFile {
                file,
                hunks: Vec::new(),
            });
            in_hunk = false;
            continue;
        }

        let Some(current) = files.last_mut() else {
            continue;
        };

        if line.starts_with("@@") {
            if let Some((old_start, new_start)) = parse_hunk_range(line) {
                old_line = old_start;
                new_line = new_start;
            }
            in_hunk = true;
            current.hunks.push(DiffHunk {
                kind: HunkKind::Header,
                content: line.to_string(),
                line_number: None,
            });
            continue;
        }

        if !in_hunk {
            continue;
        }
        if line.is_empty() {
            continue;
        }

        if let Some(content) = line.strip_prefix('+') {
            current.hunks.push(DiffHunk {
                kind: HunkKind::Addition,
                content: content.to_string(),
                line_number: Some(LineNumber {
                    old: None,
                    new: Some(new_line),
                }),
            });
            new_line += 1;
        } else if let Some(content) = line.strip_prefix('-') {
            current.hunks.push(DiffHunk {
                kind: HunkKind::Deletion,
                content: content.to_string(),
                line_number: Some(LineNumber {
                    old: Some(old_line),
                    new: None,
                }),
            });
            old_line += 1;
        } else {
            let content = line.strip_prefix(' ').unwrap_or(line);
            current.hunks.push(DiffHunk {
                kind: HunkKind::Context,
                content: content.to_string(),
                line_number: Some(LineNumber {
                    old: Some(old_line),
                    new: Some(new_line),
                }),
            });
            old_line += 1;
            new_line += 1;
        }
    }

    files
}

/// Extracts file names and insertion/deletion totals from `--stat` text.
pub fn parse_stat_summary(stat: &str) -> DiffSummary {
    let mut summary = DiffSummary::default();

    for line in stat.lines() {
        if let Some((name, _)) = line.split_once('|') {
            let name = name.trim();
            if !name.is_empty() {
                summary.files.push(name.to_string());
            }
            continue;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        for pair in words.windows(2) {
            let Ok(count) = pair[0].parse::<u64>() else {
                continue;
            };
            if pair[1].starts_with("insertion") {
                summary.insertions = count;
            } else if pair[1].starts_with("deletion") {
                summary.deletions = count;
            }
        }
    }

    summary
}

fn parse_hunk_range(header: &str) -> Option<(u32, u32)> {
    // @@ -old_start,old_count +new_start,new_count @@
    let body = header.strip_prefix("@@")?;
    let (range, _) = body.split_once("@@")?;
    let mut old_start = None;
    let mut new_start = None;
    for part in range.split_whitespace() {
        if let Some(rest) = part.strip_prefix('-') {
            old_start = first_number(rest);
        } else if let Some(rest) = part.strip_prefix('+') {
            new_start = first_number(rest);
        }
    }
    Some((old_start?, new_start?))
}

fn first_number(range: &str) -> Option<u32> {
    range
        .split(',')
        .next()
        .and_then(|start| start.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
diff --git a/src/app.js b/src/app.js
index 1111111..2222222 100644
--- a/src/app.js
+++ b/src/app.js
@@ -1,3 +1,4 @@
 const express = require('express');
+const cors = require('cors');
 const app = express();
-app.listen(3000);
+app.listen(4000);
";

    #[test]
    fn splits_files_and_types_hunk_lines() {
        let files = parse_diff(SAMPLE);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file, "src/app.js");

        let kinds: Vec<HunkKind> = files[0].hunks.iter().map(|hunk| hunk.kind).collect();
        assert_eq!(
            kinds,
            vec![
                HunkKind::Header,
                HunkKind::Context,
                HunkKind::Addition,
                HunkKind::Context,
                HunkKind::Deletion,
                HunkKind::Addition,
            ]
        );
    }

    #[test]
    fn metadata_lines_are_dropped() {
        let files = parse_diff(SAMPLE);
        assert!(files[0]
            .hunks
            .iter()
            .all(|hunk| !hunk.content.starts_with("index ")));
        assert!(files[0]
            .hunks
            .iter()
            .all(|hunk| !hunk.content.starts_with("+++")));
    }

    #[test]
    fn line_numbers_track_hunk_ranges() {
        let files = parse_diff(SAMPLE);
        let addition = &files[0].hunks[2];
        assert_eq!(
            addition.line_number,
            Some(LineNumber {
                old: None,
                new: Some(2)
            })
        );
        let deletion = &files[0].hunks[4];
        assert_eq!(
            deletion.line_number,
            Some(LineNumber {
                old: Some(3),
                new: None
            })
        );
    }

    #[test]
    fn stat_summary_collects_files_and_totals() {
        let stat = "\
 src/app.js     | 3
 src/routes.js  | 12
 2 files changed, 10 insertions(+), 5 deletions(-)
";
        let summary = parse_stat_summary(stat);
        assert_eq!(summary.files, vec!["src/app.js", "src/routes.js"]);
        assert_eq!(summary.insertions, 10);
        assert_eq!(summary.deletions, 5);
    }

    #[test]
    fn stat_summary_handles_singular_counts() {
        let stat = " a.js | 1\n 1 file changed, 1 insertion(+), 1 deletion(-)\n";
        let summary = parse_stat_summary(stat);
        assert_eq!(summary.insertions, 1);
        assert_eq!(summary.deletions, 1);
    }

    #[test]
    fn empty_diff_yields_no_files() {
        assert!(parse_diff("").is_empty());
        let summary = parse_stat_summary("");
        assert!(summary.files.is_empty());
        assert_eq!(summary.insertions, 0);
    }
}
