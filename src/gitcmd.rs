//! External command construction for the git CLI.
//!
//! Each operation kind maps to a POSIX `sh` script that drives `git` and
//! prints a single JSON document on stdout. Operation scripts always exit 0
//! and carry their verdict in the `status` field; a non-zero exit therefore
//! means the script itself broke.

use crate::process::CommandSpec;
use crate::task::types::{OperationKind, RepositoryTarget};

/// Supplies the external command for one task. The engine treats the
/// command as opaque; implementations know the tool's syntax.
pub trait CommandFactory: Send + Sync {
    fn command(&self, kind: OperationKind, target: &RepositoryTarget) -> CommandSpec;
}

/// Production factory for the `git` command line.
pub struct GitCommandFactory {
    commit_prefix: String,
}

impl GitCommandFactory {
    pub fn new(commit_prefix: impl Into<String>) -> Self {
        Self {
            commit_prefix: commit_prefix.into(),
        }
    }
}

impl CommandFactory for GitCommandFactory {
    fn command(&self, kind: OperationKind, target: &RepositoryTarget) -> CommandSpec {
        let path = target.path.to_string_lossy();
        let path = path.as_ref();
        match kind {
            OperationKind::DiscoverPull => CommandSpec::shell(DISCOVER_PULL_SCRIPT, &[path]),
            OperationKind::DiscoverPush => CommandSpec::shell(DISCOVER_PUSH_SCRIPT, &[path]),
            OperationKind::Pull => CommandSpec::shell(PULL_SCRIPT, &[&target.name, path]),
            OperationKind::Push => {
                CommandSpec::shell(PUSH_SCRIPT, &[&target.name, path, &self.commit_prefix])
            }
        }
    }
}

/// $1 = search root. Emits a JSON array of repositories behind upstream.
/// A missing root or a root with no qualifying repositories emits `[]`.
const DISCOVER_PULL_SCRIPT: &str = r#"
esc() {
    printf '%s' "$1" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' | tr -d '\n\r\t'
}
root="$1"
[ -d "$root" ] || { printf '[]'; exit 0; }
out='['
first=1
for dir in "$root"/*/; do
    [ -d "$dir/.git" ] || continue
    repo="${dir%/}"
    git -C "$repo" fetch --quiet >/dev/null 2>&1
    upstream=$(git -C "$repo" rev-parse --abbrev-ref '@{upstream}' 2>/dev/null) || continue
    behind=$(git -C "$repo" rev-list --count "HEAD..$upstream" 2>/dev/null) || continue
    [ "$behind" -gt 0 ] 2>/dev/null || continue
    [ "$first" = 1 ] || out="$out,"
    first=0
    out="$out{\"name\":\"$(esc "$(basename "$repo")")\",\"path\":\"$(esc "$repo")\",\"pending\":$behind}"
done
printf '%s]' "$out"
"#;

/// $1 = search root. Emits a JSON array of repositories with uncommitted
/// changes, `pending` counting the changed files.
const DISCOVER_PUSH_SCRIPT: &str = r#"
esc() {
    printf '%s' "$1" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' | tr -d '\n\r\t'
}
root="$1"
[ -d "$root" ] || { printf '[]'; exit 0; }
out='['
first=1
for dir in "$root"/*/; do
    [ -d "$dir/.git" ] || continue
    repo="${dir%/}"
    changed=$(git -C "$repo" status --porcelain=1 2>/dev/null | grep -c .) || continue
    [ "$changed" -gt 0 ] 2>/dev/null || continue
    [ "$first" = 1 ] || out="$out,"
    first=0
    out="$out{\"name\":\"$(esc "$(basename "$repo")")\",\"path\":\"$(esc "$repo")\",\"pending\":$changed}"
done
printf '%s]' "$out"
"#;

/// $1 = repo name, $2 = repo path. Pulls, recovering from dirty-tree
/// failures with stash / pull / stash pop; a pop that leaves merge
/// conflicts reports CONFLICT with the conflicted files.
const PULL_SCRIPT: &str = r#"
esc() {
    printf '%s' "$1" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' | tr -d '\n\r\t'
}
name="$1"
path="$2"
emit() {
    printf '{"status":"%s","repo":"%s","detail":"%s"}' "$1" "$(esc "$name")" "$(esc "$2")"
}
[ -d "$path" ] || { emit MISSING "repository path does not exist"; exit 0; }
cd "$path" || { emit MISSING "repository path is not accessible"; exit 0; }

pull_out=$(git pull 2>&1)
if [ $? -eq 0 ]; then
    emit SUCCESS ""
    exit 0
fi

case "$pull_out" in
*"Your local changes"*|*"would be overwritten"*|*"commit your changes or stash them"*)
    stash_out=$(git stash push -m "githerd auto-stash $(date '+%Y-%m-%d %H:%M:%S')" 2>&1) || {
        emit ERROR "failed to stash changes: $stash_out"
        exit 0
    }
    pull_out=$(git pull 2>&1) || {
        emit ERROR "pull failed after stashing: $pull_out"
        exit 0
    }
    pop_out=$(git stash pop 2>&1)
    if [ $? -ne 0 ]; then
        files=$(git diff --name-only --diff-filter=U 2>/dev/null)
        if [ -n "$files" ]; then
            json_files=""
            while IFS= read -r f; do
                [ -n "$f" ] || continue
                [ -z "$json_files" ] || json_files="$json_files,"
                json_files="$json_files\"$(esc "$f")\""
            done <<EOF
$files
EOF
            printf '{"status":"CONFLICT","repo":"%s","detail":"merge conflicts while restoring stash","conflict_files":[%s]}' "$(esc "$name")" "$json_files"
            exit 0
        fi
        emit ERROR "failed to restore stash: $pop_out"
        exit 0
    fi
    emit SUCCESS ""
    ;;
*)
    emit ERROR "$pull_out"
    ;;
esac
exit 0
"#;

/// $1 = repo name, $2 = repo path, $3 = commit message prefix. Stages all
/// changes, commits with a generated message listing the changed files,
/// and pushes. A clean tree is SUCCESS with nothing to do.
const PUSH_SCRIPT: &str = r#"
esc() {
    printf '%s' "$1" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' | tr -d '\n\r\t'
}
name="$1"
path="$2"
prefix="$3"
emit() {
    printf '{"status":"%s","repo":"%s","detail":"%s"}' "$1" "$(esc "$name")" "$(esc "$2")"
}
[ -d "$path" ] || { emit MISSING "repository path does not exist"; exit 0; }
cd "$path" || { emit MISSING "repository path is not accessible"; exit 0; }

status=$(git status --porcelain 2>&1)
if [ -z "$status" ]; then
    emit SUCCESS "no changes to commit"
    exit 0
fi

git add . >/dev/null 2>&1 || { emit ERROR "failed to stage changes"; exit 0; }

msg_file=$(mktemp) || { emit ERROR "failed to create commit message file"; exit 0; }
{
    printf '%s commit by %s on %s\n\n' "$prefix" "$(id -un)" "$(date '+%Y-%m-%d %H:%M:%S')"
    printf 'Changed files:\n'
    git status --porcelain | while IFS= read -r line; do
        code=$(printf '%s' "$line" | cut -c1-2 | tr -d ' ')
        file=$(printf '%s' "$line" | cut -c4-)
        case "$code" in
        M*) kind=modified ;;
        A*) kind=added ;;
        D*) kind=deleted ;;
        R*) kind=renamed ;;
        C*) kind=copied ;;
        '??') kind=untracked ;;
        *) kind="$code" ;;
        esac
        printf -- '- %s: %s\n' "$kind" "$file"
    done
} > "$msg_file"

git commit -F "$msg_file" >/dev/null 2>&1
rc=$?
rm -f "$msg_file"
[ "$rc" -eq 0 ] || { emit ERROR "failed to commit changes"; exit 0; }

push_out=$(git push 2>&1) || { emit ERROR "failed to push: $push_out"; exit 0; }
emit SUCCESS ""
exit 0
"#;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::process;
    use crate::task::types::OperationStatus;

    #[test]
    fn test_factory_builds_shell_commands() {
        let factory = GitCommandFactory::new("Sync");
        let target = RepositoryTarget::new("dotfiles", "/home/u/github/dotfiles");

        let spec = factory.command(OperationKind::Pull, &target);
        assert_eq!(spec.program, "sh");
        assert!(spec.args.contains(&"dotfiles".to_string()));
        assert!(spec.args.contains(&"/home/u/github/dotfiles".to_string()));

        let spec = factory.command(OperationKind::Push, &target);
        assert!(spec.args.contains(&"Sync".to_string()));
    }

    #[tokio::test]
    async fn test_discover_scripts_emit_empty_array_for_missing_root() {
        let factory = GitCommandFactory::new("Sync");
        let target = RepositoryTarget::new("gone", "/nonexistent/githerd-root");

        for kind in [OperationKind::DiscoverPull, OperationKind::DiscoverPush] {
            let spec = factory.command(kind, &target);
            let outcome = process::invoke(&spec, Duration::from_secs(5)).await.unwrap();
            assert!(outcome.success());
            assert_eq!(outcome.stdout.trim(), "[]");
        }
    }

    #[tokio::test]
    async fn test_discover_script_skips_plain_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("not-a-repo")).unwrap();

        let factory = GitCommandFactory::new("Sync");
        let target = RepositoryTarget::from_path(tmp.path());
        let spec = factory.command(OperationKind::DiscoverPull, &target);

        let outcome = process::invoke(&spec, Duration::from_secs(5)).await.unwrap();
        assert!(outcome.success());
        assert_eq!(
            crate::parse::parse_discovery(&outcome.stdout).unwrap(),
            vec![]
        );
    }

    #[tokio::test]
    async fn test_pull_script_reports_missing_path() {
        let factory = GitCommandFactory::new("Sync");
        let target = RepositoryTarget::new("ghost", "/nonexistent/githerd-repo");
        let spec = factory.command(OperationKind::Pull, &target);

        let outcome = process::invoke(&spec, Duration::from_secs(5)).await.unwrap();
        assert!(outcome.success());

        let report = crate::parse::parse_operation(&outcome.stdout).unwrap();
        assert_eq!(report.status, OperationStatus::Missing);
        assert_eq!(report.repo, "ghost");
    }

    #[tokio::test]
    async fn test_push_script_reports_missing_path() {
        let factory = GitCommandFactory::new("Sync");
        let target = RepositoryTarget::new("ghost", "/nonexistent/githerd-repo");
        let spec = factory.command(OperationKind::Push, &target);

        let outcome = process::invoke(&spec, Duration::from_secs(5)).await.unwrap();
        assert!(outcome.success());

        let report = crate::parse::parse_operation(&outcome.stdout).unwrap();
        assert_eq!(report.status, OperationStatus::Missing);
    }
}
