use crate::command::CommandRunner;
use crate::error::VcsError;
use crate::util;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

lazy_static! {
    /// `git remote -v` lines look like `origin\thttps://host/repo.git (fetch)`.
    static ref REMOTE_LINE: Regex = Regex::new(r"^(\S+)\s+(\S+)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Hg,
    Svn,
}

impl VcsKind {
    pub fn name(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Hg => "hg",
            VcsKind::Svn => "svn",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VcsKind {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(VcsKind::Git),
            "hg" | "mercurial" => Ok(VcsKind::Hg),
            "svn" | "subversion" => Ok(VcsKind::Svn),
            _ => Err(VcsError::UnsupportedVcs(s.to_string())),
        }
    }
}

/// The operations a package manager needs to keep a source checkout current.
///
/// Drivers are stateless; every external command goes through `runner`.
pub trait VcsDriver: Send + Sync {
    fn kind(&self) -> VcsKind;

    /// Returns true if `dir` already holds a checkout of `remote`. A `dir`
    /// that is not a checkout at all is `Ok(false)`, not an error.
    fn exists(
        &self,
        runner: &dyn CommandRunner,
        remote: &str,
        dir: &Path,
    ) -> Result<bool, VcsError>;

    /// Checks out `remote` so that the working copy lands exactly at `into`.
    fn checkout(
        &self,
        runner: &dyn CommandRunner,
        remote: &str,
        into: &Path,
    ) -> Result<(), VcsError>;

    /// Downloads new history for the checkout at `path` without touching
    /// its working tree.
    fn fetch(&self, runner: &dyn CommandRunner, path: &Path) -> Result<(), VcsError>;

    /// Applies fetched history to the working tree at `path`.
    fn update(&self, runner: &dyn CommandRunner, path: &Path) -> Result<(), VcsError>;
}

pub struct GitDriver;

impl GitDriver {
    fn read_origin(
        &self,
        runner: &dyn CommandRunner,
        root: &Path,
    ) -> Result<Option<String>, VcsError> {
        // Without a .git entry right here git would search parent directories
        // and could report the origin of an unrelated enclosing checkout.
        if !root.join(".git").exists() {
            debug!("No git metadata in {}", root.display());
            return Ok(None);
        }
        let lines = runner.output(root, &["git", "remote", "-v"])?;
        Ok(parse_origin(&lines).map(String::from))
    }
}

fn parse_origin(lines: &[String]) -> Option<&str> {
    lines
        .iter()
        .filter_map(|line| REMOTE_LINE.captures(line))
        .find(|caps| &caps[1] == "origin")
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

impl VcsDriver for GitDriver {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    fn exists(
        &self,
        runner: &dyn CommandRunner,
        remote: &str,
        dir: &Path,
    ) -> Result<bool, VcsError> {
        let origin = self.read_origin(runner, dir)?;
        debug!("Origin of {}: {:?}", dir.display(), origin);
        Ok(origin.as_deref() == Some(remote))
    }

    fn checkout(
        &self,
        runner: &dyn CommandRunner,
        remote: &str,
        into: &Path,
    ) -> Result<(), VcsError> {
        let (parent, name) = util::checkout_target(into)?;
        info!("Cloning {} into {}", remote, into.display());
        runner.expect(
            &parent,
            &["git", "clone", "-q", remote, &name],
            0,
            "git clone failed",
        )
    }

    fn fetch(&self, runner: &dyn CommandRunner, path: &Path) -> Result<(), VcsError> {
        info!("Fetching {}", path.display());
        runner.expect(path, &["git", "fetch"], 0, "git fetch failed")
    }

    fn update(&self, runner: &dyn CommandRunner, path: &Path) -> Result<(), VcsError> {
        // TODO: decide with package maintainers whether this should be --ff-only.
        info!("Pulling {}", path.display());
        runner.expect(path, &["git", "pull"], 0, "git pull failed")
    }
}

fn unsupported(kind: VcsKind, operation: &'static str) -> VcsError {
    VcsError::UnsupportedOperation {
        vcs: kind.name(),
        operation,
    }
}

pub struct HgDriver;

impl VcsDriver for HgDriver {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    fn exists(&self, _: &dyn CommandRunner, _: &str, _: &Path) -> Result<bool, VcsError> {
        Err(unsupported(self.kind(), "exists"))
    }

    fn checkout(&self, _: &dyn CommandRunner, _: &str, _: &Path) -> Result<(), VcsError> {
        Err(unsupported(self.kind(), "checkout"))
    }

    fn fetch(&self, _: &dyn CommandRunner, _: &Path) -> Result<(), VcsError> {
        Err(unsupported(self.kind(), "fetch"))
    }

    fn update(&self, _: &dyn CommandRunner, _: &Path) -> Result<(), VcsError> {
        Err(unsupported(self.kind(), "update"))
    }
}

pub struct SvnDriver;

impl VcsDriver for SvnDriver {
    fn kind(&self) -> VcsKind {
        VcsKind::Svn
    }

    fn exists(&self, _: &dyn CommandRunner, _: &str, _: &Path) -> Result<bool, VcsError> {
        Err(unsupported(self.kind(), "exists"))
    }

    fn checkout(&self, _: &dyn CommandRunner, _: &str, _: &Path) -> Result<(), VcsError> {
        Err(unsupported(self.kind(), "checkout"))
    }

    fn fetch(&self, _: &dyn CommandRunner, _: &Path) -> Result<(), VcsError> {
        Err(unsupported(self.kind(), "fetch"))
    }

    fn update(&self, _: &dyn CommandRunner, _: &Path) -> Result<(), VcsError> {
        Err(unsupported(self.kind(), "update"))
    }
}

static GIT: GitDriver = GitDriver;
static HG: HgDriver = HgDriver;
static SVN: SvnDriver = SvnDriver;

/// Returns the driver servicing `kind`.
pub fn driver(kind: VcsKind) -> &'static dyn VcsDriver {
    match kind {
        VcsKind::Git => &GIT,
        VcsKind::Hg => &HG,
        VcsKind::Svn => &SVN,
    }
}

/// Looks a driver up by its tag, e.g. `git` or `subversion`.
pub fn driver_by_name(name: &str) -> Result<&'static dyn VcsDriver, VcsError> {
    Ok(driver(name.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SystemCommandRunner;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockCommandRunner {
        exit_code: i32,
        output: Vec<String>,
        calls: RefCell<Vec<(PathBuf, Vec<String>)>>,
    }

    impl MockCommandRunner {
        fn with_output(lines: &[&str]) -> Self {
            MockCommandRunner {
                output: lines.iter().map(|l| l.to_string()).collect(),
                ..Default::default()
            }
        }

        fn record(&self, cwd: &Path, cmd: &[&str]) {
            self.calls.borrow_mut().push((
                cwd.to_path_buf(),
                cmd.iter().map(|s| s.to_string()).collect(),
            ));
        }

        fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for MockCommandRunner {
        fn wait_for(&self, cwd: &Path, cmd: &[&str]) -> Result<i32, VcsError> {
            self.record(cwd, cmd);
            Ok(self.exit_code)
        }

        fn output(&self, cwd: &Path, cmd: &[&str]) -> Result<Vec<String>, VcsError> {
            self.record(cwd, cmd);
            Ok(self.output.clone())
        }

        fn error_output(&self, cwd: &Path, cmd: &[&str]) -> Result<Vec<String>, VcsError> {
            self.record(cwd, cmd);
            Ok(Vec::new())
        }
    }

    const REMOTE: &str = "https://example.com/r.git";

    #[test]
    fn test_kind_parsing() {
        assert_eq!("git".parse::<VcsKind>().unwrap(), VcsKind::Git);
        assert_eq!("Mercurial".parse::<VcsKind>().unwrap(), VcsKind::Hg);
        assert_eq!("svn".parse::<VcsKind>().unwrap(), VcsKind::Svn);
        assert!(matches!(
            "cvs".parse::<VcsKind>(),
            Err(VcsError::UnsupportedVcs(name)) if name == "cvs"
        ));
    }

    #[test]
    fn test_driver_selection() {
        for kind in [VcsKind::Git, VcsKind::Hg, VcsKind::Svn] {
            assert_eq!(driver(kind).kind(), kind);
        }
        assert_eq!(driver_by_name("subversion").unwrap().kind(), VcsKind::Svn);
        assert!(matches!(
            driver_by_name("bzr"),
            Err(VcsError::UnsupportedVcs(_))
        ));
    }

    #[test]
    fn test_git_exists_without_metadata() {
        let temp_dir = tempdir().unwrap();
        let runner =
            MockCommandRunner::with_output(&["origin\thttps://example.com/r.git (fetch)"]);

        assert!(!GitDriver.exists(&runner, REMOTE, temp_dir.path()).unwrap());
        assert!(runner.calls().is_empty());

        let missing = temp_dir.path().join("missing");
        assert!(!GitDriver.exists(&runner, REMOTE, &missing).unwrap());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_git_exists_matching_origin() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let runner = MockCommandRunner::with_output(&[
            "upstream\thttps://example.com/other.git (fetch)",
            "origin\thttps://example.com/r.git (fetch)",
            "origin\thttps://example.com/r.git (push)",
        ]);

        assert!(GitDriver.exists(&runner, REMOTE, temp_dir.path()).unwrap());
        assert_eq!(
            runner.calls(),
            vec![(
                temp_dir.path().to_path_buf(),
                vec!["git".to_string(), "remote".to_string(), "-v".to_string()]
            )]
        );
    }

    #[test]
    fn test_git_exists_other_origin() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let runner =
            MockCommandRunner::with_output(&["origin\thttps://example.com/r.git.bak (fetch)"]);
        assert!(!GitDriver.exists(&runner, REMOTE, temp_dir.path()).unwrap());

        let runner =
            MockCommandRunner::with_output(&["mirror\thttps://example.com/r.git (fetch)"]);
        assert!(!GitDriver.exists(&runner, REMOTE, temp_dir.path()).unwrap());

        let runner = MockCommandRunner::default();
        assert!(!GitDriver.exists(&runner, REMOTE, temp_dir.path()).unwrap());
    }

    #[test]
    fn test_parse_origin() {
        let lines: Vec<String> = vec![
            "origin".to_string(),
            "  origin https://example.com/indented.git".to_string(),
            "origin  git@example.com:r.git (fetch)".to_string(),
        ];
        assert_eq!(parse_origin(&lines), Some("git@example.com:r.git"));
        assert_eq!(parse_origin(&[]), None);
    }

    #[test]
    fn test_git_checkout() {
        let runner = MockCommandRunner::default();
        GitDriver.checkout(&runner, REMOTE, Path::new("/tmp/work/proj")).unwrap();

        assert_eq!(
            runner.calls(),
            vec![(
                PathBuf::from("/tmp/work"),
                vec!["git", "clone", "-q", REMOTE, "proj"]
                    .into_iter()
                    .map(String::from)
                    .collect::<Vec<String>>()
            )]
        );
    }

    #[test]
    fn test_git_checkout_failure() {
        let runner = MockCommandRunner {
            exit_code: 1,
            ..Default::default()
        };
        let result = GitDriver.checkout(&runner, REMOTE, Path::new("/tmp/work/proj"));
        match result {
            Err(VcsError::CommandFailed(msg)) => assert_eq!(msg, "git clone failed"),
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_git_checkout_parent_resolved_through_symlink() {
        let temp_dir = tempdir().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join("x")).unwrap();
        fs::create_dir_all(base.join("y/sub")).unwrap();
        std::os::unix::fs::symlink(base.join("y/sub"), base.join("x/link")).unwrap();

        let runner = MockCommandRunner::default();
        GitDriver.checkout(&runner, REMOTE, &base.join("x/link/../proj")).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let (cwd, cmd) = &calls[0];
        assert_eq!(cmd.last().map(String::as_str), Some("proj"));
        // The clone runs where the OS puts `x/link/..`, i.e. inside `y`.
        assert_eq!(
            fs::canonicalize(cwd).unwrap(),
            fs::canonicalize(base.join("y")).unwrap()
        );
    }

    #[test]
    fn test_git_checkout_missing_parent() {
        let temp_dir = tempdir().unwrap();
        let into = temp_dir.path().join("missing/proj");
        let runner = SystemCommandRunner::default();

        let result = GitDriver.checkout(&runner, REMOTE, &into);
        assert!(matches!(result, Err(VcsError::PathResolution { .. })));
    }

    #[test]
    fn test_git_fetch_and_update() {
        let runner = MockCommandRunner::default();
        let path = Path::new("/src/proj");
        GitDriver.fetch(&runner, path).unwrap();
        GitDriver.update(&runner, path).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (path.to_path_buf(), vec!["git".to_string(), "fetch".to_string()]));
        assert_eq!(calls[1], (path.to_path_buf(), vec!["git".to_string(), "pull".to_string()]));
    }

    #[test]
    fn test_git_fetch_and_update_failure() {
        let runner = MockCommandRunner {
            exit_code: 128,
            ..Default::default()
        };
        let path = Path::new("/src/proj");

        assert!(matches!(
            GitDriver.fetch(&runner, path),
            Err(VcsError::CommandFailed(msg)) if msg == "git fetch failed"
        ));
        assert!(matches!(
            GitDriver.update(&runner, path),
            Err(VcsError::CommandFailed(msg)) if msg == "git pull failed"
        ));
    }

    #[test]
    fn test_unimplemented_drivers() {
        let runner = MockCommandRunner::default();
        let path = Path::new("/src/proj");

        for kind in [VcsKind::Hg, VcsKind::Svn] {
            let backend = driver(kind);
            let results = [
                backend.exists(&runner, REMOTE, path).map(|_| ()),
                backend.checkout(&runner, REMOTE, path),
                backend.fetch(&runner, path),
                backend.update(&runner, path),
            ];
            for (result, op) in results.into_iter().zip(["exists", "checkout", "fetch", "update"]) {
                match result {
                    Err(VcsError::UnsupportedOperation { vcs, operation }) => {
                        assert_eq!(vcs, kind.name());
                        assert_eq!(operation, op);
                    }
                    other => panic!("expected UnsupportedOperation, got {:?}", other),
                }
            }
        }
        assert!(runner.calls().is_empty());
    }
}
