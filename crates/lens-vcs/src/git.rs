use crate::backend::{BranchComparison, BranchInfo, RepoInfo, VcsError};
use gix::bstr::ByteSlice;
use gix::diff::blob::intern::InternedInput;
use gix::diff::blob::sink::Counter;
use gix::diff::blob::sources::lines_with_terminator;
use gix::diff::blob::{Algorithm, UnifiedDiffBuilder};
use gix::objs::tree::{EntryKind as TreeEntryKind, EntryMode};
use gix::progress::Discard;
use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit, RefLog};
use gix::refs::Target;
use gix::ObjectId;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::AtomicBool;

pub struct GitBackend;

impl GitBackend {
    /// Current branch plus working-copy changes bucketed into the
    /// modified/created/deleted/renamed lists the UI expects.
    pub fn repo_info(repo_path: &Path) -> Result<RepoInfo, VcsError> {
        let repo = open_repo(repo_path)?;
        let workdir = repo.workdir().map(Path::to_path_buf);
        let mut info = RepoInfo {
            current_branch: current_branch(&repo),
            ..RepoInfo::default()
        };

        let items = repo
            .status(Discard)
            .map_err(map_backend_error("status"))?
            .into_iter(Vec::new())
            .map_err(map_backend_error("status iter"))?;
        for item in items {
            let item = item.map_err(map_backend_error("status item"))?;
            match item {
                gix::status::Item::IndexWorktree(worktree_item) => {
                    use gix::status::index_worktree::Item;
                    match worktree_item {
                        Item::Modification { rela_path, .. } => {
                            let path = rela_path.to_string();
                            if file_missing(workdir.as_deref(), &path) {
                                push_unique(&mut info.deleted, path);
                            } else {
                                push_unique(&mut info.modified, path);
                            }
                        }
                        Item::DirectoryContents { entry, .. } => {
                            push_unique(&mut info.created, entry.rela_path.to_string());
                        }
                        Item::Rewrite {
                            dirwalk_entry,
                            source,
                            ..
                        } => {
                            push_unique(
                                &mut info.renamed,
                                format!("{} -> {}", source.rela_path(), dirwalk_entry.rela_path),
                            );
                        }
                    }
                }
                gix::status::Item::TreeIndex(change) => {
                    // Staged changes; the worktree decides whether the entry
                    // still exists.
                    let path = change.location().to_string();
                    if file_missing(workdir.as_deref(), &path) {
                        push_unique(&mut info.deleted, path);
                    } else {
                        push_unique(&mut info.modified, path);
                    }
                }
            }
        }

        Ok(info)
    }

    pub fn branches(repo_path: &Path) -> Result<BranchInfo, VcsError> {
        let repo = open_repo(repo_path)?;
        let references = repo.references().map_err(map_backend_error("references"))?;

        let mut all = Vec::new();
        for reference in references.all().map_err(map_backend_error("iter refs"))? {
            let reference = reference.map_err(map_backend_error("read ref"))?;
            let name = reference.name().as_bstr().to_str_lossy();
            if let Some(branch) = name.strip_prefix("refs/heads/") {
                all.push(branch.to_string());
            }
        }
        all.sort();

        Ok(BranchInfo {
            all,
            current: current_branch(&repo),
        })
    }

    /// Diff two branches tree-to-tree, producing raw unified-diff text plus a
    /// `--stat`-style summary. `base` defaults to the current HEAD.
    pub fn compare(
        repo_path: &Path,
        target_branch: &str,
        base_branch: Option<&str>,
    ) -> Result<BranchComparison, VcsError> {
        let repo = open_repo(repo_path)?;
        let base_tree = match base_branch {
            Some(name) => branch_tree(&repo, name)?,
            None => head_tree(&repo)?,
        };
        let target_tree = branch_tree(&repo, target_branch)?;

        let changes = repo
            .diff_tree_to_tree(&base_tree, &target_tree, None)
            .map_err(|err| VcsError::DiffFailed {
                reason: err.to_string(),
            })?;

        let mut unified = String::new();
        let mut stats = Vec::new();
        for change in changes {
            match change {
                gix::object::tree::diff::ChangeDetached::Addition {
                    location,
                    entry_mode,
                    id,
                    ..
                } => {
                    if !is_blob_entry(entry_mode) {
                        continue;
                    }
                    let path = location.to_str_lossy().to_string();
                    let new_text = blob_text(&repo, id)?;
                    let counts =
                        append_file_diff(&mut unified, &path, &path, None, Some(&new_text))?;
                    stats.push((path, counts));
                }
                gix::object::tree::diff::ChangeDetached::Deletion {
                    location,
                    entry_mode,
                    id,
                    ..
                } => {
                    if !is_blob_entry(entry_mode) {
                        continue;
                    }
                    let path = location.to_str_lossy().to_string();
                    let old_text = blob_text(&repo, id)?;
                    let counts =
                        append_file_diff(&mut unified, &path, &path, Some(&old_text), None)?;
                    stats.push((path, counts));
                }
                gix::object::tree::diff::ChangeDetached::Modification {
                    location,
                    previous_entry_mode,
                    entry_mode,
                    previous_id,
                    id,
                    ..
                } => {
                    if !is_blob_entry(entry_mode) || !is_blob_entry(previous_entry_mode) {
                        continue;
                    }
                    let path = location.to_str_lossy().to_string();
                    let old_text = blob_text(&repo, previous_id)?;
                    let new_text = blob_text(&repo, id)?;
                    let counts = append_file_diff(
                        &mut unified,
                        &path,
                        &path,
                        Some(&old_text),
                        Some(&new_text),
                    )?;
                    stats.push((path, counts));
                }
                gix::object::tree::diff::ChangeDetached::Rewrite {
                    source_location,
                    location,
                    source_entry_mode,
                    entry_mode,
                    source_id,
                    id,
                    ..
                } => {
                    if !is_blob_entry(entry_mode) || !is_blob_entry(source_entry_mode) {
                        continue;
                    }
                    let old_path = source_location.to_str_lossy().to_string();
                    let new_path = location.to_str_lossy().to_string();
                    let old_text = blob_text(&repo, source_id)?;
                    let new_text = blob_text(&repo, id)?;
                    let counts = append_file_diff(
                        &mut unified,
                        &old_path,
                        &new_path,
                        Some(&old_text),
                        Some(&new_text),
                    )?;
                    stats.push((new_path, counts));
                }
            }
        }

        Ok(BranchComparison {
            unified,
            stat: render_stat(&stats),
        })
    }

    /// Points HEAD at the named branch and resets the worktree and index to
    /// its tree.
    pub fn checkout(repo_path: &Path, branch: &str) -> Result<(), VcsError> {
        let repo = open_repo(repo_path)?;
        let full_ref = ref_full_name(branch);
        let mut reference = repo
            .find_reference(&full_ref)
            .map_err(|_| VcsError::RefNotFound {
                name: branch.to_string(),
            })?;
        let target = reference.peel_to_id().map_err(map_checkout_error("peel ref"))?;

        let head_name: gix::refs::FullName = "HEAD"
            .try_into()
            .map_err(map_checkout_error("head name"))?;
        let branch_name: gix::refs::FullName = full_ref
            .try_into()
            .map_err(map_checkout_error("branch name"))?;
        repo.edit_reference(RefEdit {
            change: Change::Update {
                log: LogChange {
                    mode: RefLog::AndReference,
                    force_create_reflog: false,
                    message: "checkout".into(),
                },
                expected: PreviousValue::Any,
                new: Target::Symbolic(branch_name),
            },
            name: head_name,
            deref: false,
        })
        .map_err(map_checkout_error("update HEAD"))?;

        let workdir = repo.workdir().ok_or_else(|| VcsError::CheckoutFailed {
            reason: "bare repository".to_string(),
        })?;
        let tree_id = target
            .object()
            .map_err(map_checkout_error("load target object"))?
            .peel_to_tree()
            .map_err(map_checkout_error("peel tree"))?
            .id;
        let mut index = repo
            .index_from_tree(&tree_id)
            .map_err(map_checkout_error("index from tree"))?;
        let options = repo
            .checkout_options(gix::worktree::stack::state::attributes::Source::IdMapping)
            .map_err(map_checkout_error("checkout options"))?;
        let progress = Discard;
        let should_interrupt = AtomicBool::new(false);
        gix::worktree::state::checkout(
            &mut index,
            workdir,
            repo.objects
                .clone()
                .into_arc()
                .map_err(map_checkout_error("odb"))?,
            &progress,
            &progress,
            &should_interrupt,
            options,
        )
        .map_err(map_checkout_error("checkout"))?;
        index
            .write(Default::default())
            .map_err(map_checkout_error("write index"))?;
        Ok(())
    }
}

fn open_repo(repo_path: &Path) -> Result<gix::Repository, VcsError> {
    gix::open(repo_path).map_err(|_| VcsError::RepoNotFound)
}

fn current_branch(repo: &gix::Repository) -> Option<String> {
    repo.head()
        .ok()?
        .referent_name()
        .map(|name| name.shorten().to_string())
}

fn branch_tree<'repo>(
    repo: &'repo gix::Repository,
    name: &str,
) -> Result<gix::Tree<'repo>, VcsError> {
    let mut reference =
        repo.find_reference(&ref_full_name(name))
            .map_err(|_| VcsError::RefNotFound {
                name: name.to_string(),
            })?;
    let target = reference.peel_to_id().map_err(map_backend_error("peel ref"))?;
    target
        .object()
        .map_err(map_backend_error("load object"))?
        .peel_to_tree()
        .map_err(map_backend_error("peel tree"))
}

fn head_tree(repo: &gix::Repository) -> Result<gix::Tree<'_>, VcsError> {
    let commit = repo.head_commit().map_err(map_backend_error("head commit"))?;
    commit.tree().map_err(map_backend_error("head tree"))
}

fn ref_full_name(name: &str) -> String {
    format!("refs/heads/{name}")
}

fn map_backend_error<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> VcsError {
    move |err| VcsError::BackendError {
        reason: format!("{context}: {err}"),
    }
}

fn map_checkout_error<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> VcsError {
    move |err| VcsError::CheckoutFailed {
        reason: format!("{context}: {err}"),
    }
}

fn is_blob_entry(mode: EntryMode) -> bool {
    matches!(
        TreeEntryKind::from(mode),
        TreeEntryKind::Blob | TreeEntryKind::BlobExecutable
    )
}

fn blob_text(repo: &gix::Repository, id: ObjectId) -> Result<String, VcsError> {
    let blob = repo.find_blob(id).map_err(map_backend_error("load blob"))?;
    Ok(String::from_utf8_lossy(&blob.data).to_string())
}

fn file_missing(workdir: Option<&Path>, rel_path: &str) -> bool {
    workdir.is_some_and(|dir| !dir.join(rel_path).exists())
}

fn push_unique(bucket: &mut Vec<String>, path: String) {
    if !bucket.contains(&path) {
        bucket.push(path);
    }
}

/// Appends one file's unified diff (with `diff --git` and `---`/`+++` headers)
/// and returns its (insertions, deletions) counts.
fn append_file_diff(
    output: &mut String,
    old_path: &str,
    new_path: &str,
    old_text: Option<&str>,
    new_text: Option<&str>,
) -> Result<(u32, u32), VcsError> {
    writeln!(output, "diff --git a/{old_path} b/{new_path}")
        .map_err(map_backend_error("write diff"))?;
    let left_header = if old_text.is_some() {
        format!("a/{old_path}")
    } else {
        "/dev/null".to_string()
    };
    let right_header = if new_text.is_some() {
        format!("b/{new_path}")
    } else {
        "/dev/null".to_string()
    };
    writeln!(output, "--- {left_header}").map_err(map_backend_error("write diff"))?;
    writeln!(output, "+++ {right_header}").map_err(map_backend_error("write diff"))?;

    let diff = diff_text(old_text, new_text);
    if !diff.wrapped.is_empty() {
        output.push_str(diff.wrapped.as_str());
        if !output.ends_with('\n') {
            output.push('\n');
        }
    }
    Ok((diff.insertions, diff.removals))
}

fn diff_text(old_text: Option<&str>, new_text: Option<&str>) -> Counter<String> {
    let input = InternedInput::new(
        lines_with_terminator(old_text.unwrap_or_default()),
        lines_with_terminator(new_text.unwrap_or_default()),
    );
    gix::diff::blob::diff(
        Algorithm::Histogram,
        &input,
        Counter::new(UnifiedDiffBuilder::new(&input)),
    )
}

/// Renders the summary text the stat parser consumes, shaped like
/// `git diff --stat` output.
fn render_stat(entries: &[(String, (u32, u32))]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let mut insertions = 0u64;
    let mut deletions = 0u64;
    for (path, (added, removed)) in entries {
        let _ = writeln!(out, " {path} | {}", added + removed);
        insertions += u64::from(*added);
        deletions += u64::from(*removed);
    }
    let files = entries.len();
    let _ = writeln!(
        out,
        " {files} file{} changed, {insertions} insertion{}(+), {deletions} deletion{}(-)",
        plural(files as u64),
        plural(insertions),
        plural(deletions)
    );
    out
}

fn plural(count: u64) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_repo_is_repo_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitBackend::repo_info(dir.path()),
            Err(VcsError::RepoNotFound)
        ));
        assert!(matches!(
            GitBackend::branches(dir.path()),
            Err(VcsError::RepoNotFound)
        ));
        assert!(matches!(
            GitBackend::compare(dir.path(), "feature", None),
            Err(VcsError::RepoNotFound)
        ));
    }

    #[test]
    fn stat_rendering_matches_git_shape() {
        let entries = vec![
            ("src/a.js".to_string(), (10, 2)),
            ("src/b.js".to_string(), (1, 0)),
        ];
        let stat = render_stat(&entries);
        assert!(stat.contains(" src/a.js | 12"));
        assert!(stat.contains(" 2 files changed, 11 insertions(+), 2 deletions(-)"));
    }

    #[test]
    fn stat_rendering_uses_singular_forms() {
        let entries = vec![("src/a.js".to_string(), (1, 1))];
        let stat = render_stat(&entries);
        assert!(stat.contains(" 1 file changed, 1 insertion(+), 1 deletion(-)"));
    }

    #[test]
    fn empty_comparison_renders_empty_stat() {
        assert_eq!(render_stat(&[]), "");
    }
}
