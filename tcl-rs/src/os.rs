//! Operating-system collaborators.
//!
//! The interpreter never touches the OS directly; it goes through
//! [`OsAccess`] (environment, clock, filesystem facts) and
//! [`ProcessRunner`] (external command pipelines).  Production code
//! installs [`RealOs`] and [`RealRunner`]; tests substitute mocks.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::FromRawFd;
use std::process::{Child, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

// ── OsAccess ──────────────────────────────────────────────────────────────────

/// Filesystem facts for one path, from a single stat call.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Permission probe kinds for [`OsAccess::access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

/// Environment, clock, and filesystem access.
pub trait OsAccess {
    fn env_var(&self, name: &str) -> Option<String>;
    fn cwd(&self) -> Option<String>;
    fn chdir(&self, dir: &str) -> bool;
    fn home_dir(&self) -> Option<String>;
    fn hostname(&self) -> String;
    fn pid(&self) -> u32;
    /// Wall clock as (seconds, microseconds) since the epoch.
    fn now_secs_usecs(&self) -> (i64, i64);
    fn sleep_ms(&self, ms: u64);
    fn stat(&self, path: &str) -> Option<FileStat>;
    fn access(&self, path: &str, mode: AccessMode) -> bool;
    fn is_owned(&self, path: &str) -> bool;
    /// Account name for a numeric user id, when the system knows one.
    fn user_name(&self, _uid: u32) -> Option<String> {
        None
    }
    /// Group name for a numeric group id, when the system knows one.
    fn group_name(&self, _gid: u32) -> Option<String> {
        None
    }
    /// Names (not paths) of directory entries, sorted.
    fn list_dir(&self, dir: &str) -> Vec<String>;
    /// Resolve a program name against `PATH` (or verify a path with a
    /// slash).  Returns the full path of a regular executable file.
    fn find_executable(&self, name: &str) -> Option<String>;
}

/// The production [`OsAccess`].
#[derive(Debug, Default)]
pub struct RealOs;

impl OsAccess for RealOs {
    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn cwd(&self) -> Option<String> {
        std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn chdir(&self, dir: &str) -> bool {
        std::env::set_current_dir(dir).is_ok()
    }

    fn home_dir(&self) -> Option<String> {
        directories::UserDirs::new().map(|u| u.home_dir().to_string_lossy().into_owned())
    }

    fn hostname(&self) -> String {
        let mut buf = [0u8; 256];
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if rc != 0 {
            return String::new();
        }
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..end]).into_owned()
    }

    fn pid(&self) -> u32 {
        std::process::id()
    }

    fn now_secs_usecs(&self) -> (i64, i64) {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as i64, d.subsec_micros() as i64),
            Err(_) => (0, 0),
        }
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }

    fn stat(&self, path: &str) -> Option<FileStat> {
        let md = std::fs::metadata(path).ok()?;
        Some(FileStat {
            is_file: md.is_file(),
            is_dir: md.is_dir(),
            size: md.len(),
            mtime: md.mtime(),
            atime: md.atime(),
            mode: md.mode(),
            uid: md.uid(),
            gid: md.gid(),
        })
    }

    fn access(&self, path: &str, mode: AccessMode) -> bool {
        let Ok(cpath) = CString::new(path) else {
            return false;
        };
        let flag = match mode {
            AccessMode::Read => libc::R_OK,
            AccessMode::Write => libc::W_OK,
            AccessMode::Execute => libc::X_OK,
        };
        unsafe { libc::access(cpath.as_ptr(), flag) == 0 }
    }

    fn is_owned(&self, path: &str) -> bool {
        match std::fs::metadata(path) {
            Ok(md) => md.uid() == unsafe { libc::geteuid() },
            Err(_) => false,
        }
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        let pw = unsafe { libc::getpwuid(uid) };
        if pw.is_null() {
            return None;
        }
        let name = unsafe { std::ffi::CStr::from_ptr((*pw).pw_name) };
        Some(name.to_string_lossy().into_owned())
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        let gr = unsafe { libc::getgrgid(gid) };
        if gr.is_null() {
            return None;
        }
        let name = unsafe { std::ffi::CStr::from_ptr((*gr).gr_name) };
        Some(name.to_string_lossy().into_owned())
    }

    fn list_dir(&self, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn find_executable(&self, name: &str) -> Option<String> {
        let candidate_ok = |path: &str| {
            self.stat(path).is_some_and(|st| st.is_file) && self.access(path, AccessMode::Execute)
        };
        if name.contains('/') {
            return candidate_ok(name).then(|| name.to_owned());
        }
        let path_var = self.env_var("PATH")?;
        for dir in path_var.split(':') {
            if dir.is_empty() {
                continue;
            }
            let full = format!("{dir}/{name}");
            if candidate_ok(&full) {
                return Some(full);
            }
        }
        None
    }
}

// ── Pipeline descriptors ──────────────────────────────────────────────────────

/// One external command in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    /// Resolved program path.
    pub program: String,
    pub args: Vec<String>,
    /// `|&`: this stage's stderr joins the pipe to the next stage.
    pub pipe_stderr: bool,
}

/// Where the first stage reads from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StdinSource {
    #[default]
    Inherit,
    /// `< file`
    File(String),
    /// `<@ channelId`
    Channel(String),
    /// `<< value`
    Literal(String),
}

/// Where an output stream goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutTarget {
    /// `> file` / `>> file`
    File { path: String, append: bool },
    /// `>@ channelId` / `2>@ channelId`, not yet resolved to a file
    Channel(String),
    /// `2>@1`, or `>@ stdout`
    ToStdout,
    /// `>@ stderr` / `2>@ stderr`
    ToStderr,
}

/// A parsed external command line, ready for a [`ProcessRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
    pub stdin: StdinSource,
    pub stdout: Option<OutTarget>,
    pub stderr: Option<OutTarget>,
    /// `>&` / `>>&` / `>&@`: stderr of the last stage follows stdout.
    pub merge_stderr: bool,
}

/// Captured output of a finished pipeline, plus the exit status of its
/// first stage.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    pub stdout: String,
    pub status: i32,
}

/// Executes [`Pipeline`]s.
pub trait ProcessRunner {
    /// Run the pipeline, optionally capturing the last stage's stdout.
    fn run(&self, pipeline: &Pipeline, capture: bool) -> Result<ProcessResult, String>;
}

/// The production [`ProcessRunner`], built on `std::process`.
#[derive(Debug, Default)]
pub struct RealRunner;

impl ProcessRunner for RealRunner {
    fn run(&self, pipeline: &Pipeline, capture: bool) -> Result<ProcessResult, String> {
        if pipeline.stages.is_empty() {
            return Ok(ProcessResult::default());
        }
        let last_index = pipeline.stages.len() - 1;
        let mut children: Vec<Child> = Vec::new();
        let mut prev_read: Option<Stdio> = None;

        for (i, stage) in pipeline.stages.iter().enumerate() {
            let mut cmd = Command::new(&stage.program);
            cmd.args(&stage.args);

            if i == 0 {
                match &pipeline.stdin {
                    StdinSource::Inherit => {}
                    StdinSource::File(path) => {
                        let f = File::open(path)
                            .map_err(|e| format!("couldn't read file \"{path}\": {e}"))?;
                        cmd.stdin(Stdio::from(f));
                    }
                    StdinSource::Literal(_) => {
                        cmd.stdin(Stdio::piped());
                    }
                    StdinSource::Channel(id) => {
                        return Err(format!("can not find channel named \"{id}\""));
                    }
                }
            } else if let Some(rd) = prev_read.take() {
                cmd.stdin(rd);
            }

            if i < last_index {
                if stage.pipe_stderr {
                    // stdout and stderr must share one pipe, which
                    // std::process cannot express on its own.
                    let (rd, wr, wr2) = shared_pipe()?;
                    cmd.stdout(wr);
                    cmd.stderr(wr2);
                    prev_read = Some(rd);
                } else {
                    cmd.stdout(Stdio::piped());
                }
            } else {
                match &pipeline.stdout {
                    None => {
                        if capture {
                            cmd.stdout(Stdio::piped());
                        }
                    }
                    Some(OutTarget::File { path, append }) => {
                        let f = open_out(path, *append)?;
                        cmd.stdout(Stdio::from(f));
                    }
                    Some(OutTarget::Channel(id)) => {
                        return Err(format!("can not find channel named \"{id}\""));
                    }
                    Some(OutTarget::ToStdout) => {}
                    Some(OutTarget::ToStderr) => {
                        cmd.stdout(dup_stdio(libc::STDERR_FILENO)?);
                    }
                }
                match &pipeline.stderr {
                    None => {
                        if pipeline.merge_stderr {
                            match &pipeline.stdout {
                                Some(OutTarget::File { path, append }) => {
                                    let f = open_out(path, *append)?;
                                    cmd.stderr(Stdio::from(f));
                                }
                                Some(OutTarget::ToStderr) => {}
                                _ => {
                                    if capture {
                                        cmd.stderr(Stdio::piped());
                                    }
                                }
                            }
                        }
                    }
                    Some(OutTarget::File { path, append }) => {
                        let f = open_out(path, *append)?;
                        cmd.stderr(Stdio::from(f));
                    }
                    Some(OutTarget::Channel(id)) => {
                        return Err(format!("can not find channel named \"{id}\""));
                    }
                    Some(OutTarget::ToStdout) => {
                        if capture {
                            cmd.stderr(Stdio::piped());
                        } else {
                            cmd.stderr(dup_stdio(libc::STDOUT_FILENO)?);
                        }
                    }
                    Some(OutTarget::ToStderr) => {}
                }
            }

            let mut child = cmd
                .spawn()
                .map_err(|e| format!("couldn't execute \"{}\": {e}", stage.program))?;

            if i == 0 {
                if let StdinSource::Literal(text) = &pipeline.stdin {
                    if let Some(mut stdin) = child.stdin.take() {
                        let _ = stdin.write_all(text.as_bytes());
                    }
                }
            }
            if i < last_index && !stage.pipe_stderr {
                prev_read = child.stdout.take().map(Stdio::from);
            }
            children.push(child);
        }

        let mut result = ProcessResult::default();
        for (i, mut child) in children.into_iter().enumerate() {
            if i == last_index && capture {
                let out = child
                    .wait_with_output()
                    .map_err(|e| format!("wait failed: {e}"))?;
                result.stdout = String::from_utf8_lossy(&out.stdout).into_owned();
                result.stdout.push_str(&String::from_utf8_lossy(&out.stderr));
                if i == 0 {
                    result.status = out.status.code().unwrap_or(-1);
                }
            } else {
                let status = child.wait().map_err(|e| format!("wait failed: {e}"))?;
                if i == 0 {
                    result.status = status.code().unwrap_or(-1);
                }
            }
        }
        Ok(result)
    }
}

// Duplicate one of our own standard descriptors for a child's stream.
fn dup_stdio(fd: i32) -> Result<Stdio, String> {
    let duped = unsafe { libc::dup(fd) };
    if duped < 0 {
        return Err("couldn't duplicate descriptor".to_owned());
    }
    Ok(unsafe { Stdio::from_raw_fd(duped) })
}

// One pipe with the write end duplicated, so a stage can send both of
// its output streams down the same channel.
fn shared_pipe() -> Result<(Stdio, Stdio, Stdio), String> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err("couldn't create pipe".to_owned());
    }
    let wr2 = unsafe { libc::dup(fds[1]) };
    if wr2 < 0 {
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
        return Err("couldn't create pipe".to_owned());
    }
    unsafe {
        Ok((
            Stdio::from_raw_fd(fds[0]),
            Stdio::from_raw_fd(fds[1]),
            Stdio::from_raw_fd(wr2),
        ))
    }
}

fn open_out(path: &str, append: bool) -> Result<File, String> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true);
    if append {
        opts.append(true);
    } else {
        opts.truncate(true);
    }
    opts.open(path)
        .map_err(|e| format!("couldn't write file \"{path}\": {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn stat_reports_regular_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "hello").unwrap();
        let os = RealOs;
        let st = os.stat(tmp.path().to_str().unwrap()).unwrap();
        assert!(st.is_file);
        assert!(!st.is_dir);
        assert_eq!(st.size, 6);
    }

    #[test]
    fn stat_missing_is_none() {
        assert!(RealOs.stat("/no/such/path/at/all").is_none());
    }

    #[test]
    fn find_executable_resolves_sh() {
        let os = RealOs;
        let path = os.find_executable("sh").expect("sh should be on PATH");
        assert!(path.ends_with("/sh"));
        assert!(os.find_executable("definitely-not-a-command-xyz").is_none());
    }

    #[test]
    fn list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let names = RealOs.list_dir(dir.path().to_str().unwrap());
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn runner_captures_stdout() {
        let os = RealOs;
        let echo = os.find_executable("echo").expect("echo on PATH");
        let pipeline = Pipeline {
            stages: vec![PipelineStage {
                program: echo,
                args: vec!["hello".to_owned()],
                pipe_stderr: false,
            }],
            ..Default::default()
        };
        let result = RealRunner.run(&pipeline, true).unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.status, 0);
    }

    #[test]
    fn runner_chains_stages() {
        let os = RealOs;
        let echo = os.find_executable("echo").expect("echo on PATH");
        let tr = os.find_executable("tr").expect("tr on PATH");
        let pipeline = Pipeline {
            stages: vec![
                PipelineStage {
                    program: echo,
                    args: vec!["abc".to_owned()],
                    pipe_stderr: false,
                },
                PipelineStage {
                    program: tr,
                    args: vec!["a-z".to_owned(), "A-Z".to_owned()],
                    pipe_stderr: false,
                },
            ],
            ..Default::default()
        };
        let result = RealRunner.run(&pipeline, true).unwrap();
        assert_eq!(result.stdout.trim(), "ABC");
    }

    #[test]
    fn runner_reports_first_stage_status() {
        let os = RealOs;
        let sh = os.find_executable("sh").expect("sh on PATH");
        let cat = os.find_executable("cat").expect("cat on PATH");
        let pipeline = Pipeline {
            stages: vec![
                PipelineStage {
                    program: sh,
                    args: vec!["-c".to_owned(), "exit 3".to_owned()],
                    pipe_stderr: false,
                },
                PipelineStage {
                    program: cat,
                    args: vec![],
                    pipe_stderr: false,
                },
            ],
            ..Default::default()
        };
        let result = RealRunner.run(&pipeline, true).unwrap();
        assert_eq!(result.status, 3);
    }

    #[test]
    fn runner_pipes_stderr_on_request() {
        let os = RealOs;
        let sh = os.find_executable("sh").expect("sh on PATH");
        let cat = os.find_executable("cat").expect("cat on PATH");
        let pipeline = Pipeline {
            stages: vec![
                PipelineStage {
                    program: sh,
                    args: vec!["-c".to_owned(), "echo out; echo err >&2".to_owned()],
                    pipe_stderr: true,
                },
                PipelineStage {
                    program: cat,
                    args: vec![],
                    pipe_stderr: false,
                },
            ],
            ..Default::default()
        };
        let result = RealRunner.run(&pipeline, true).unwrap();
        assert!(result.stdout.contains("out"));
        assert!(result.stdout.contains("err"));
    }

    #[test]
    fn runner_literal_stdin() {
        let os = RealOs;
        let cat = os.find_executable("cat").expect("cat on PATH");
        let pipeline = Pipeline {
            stages: vec![PipelineStage {
                program: cat,
                args: vec![],
                pipe_stderr: false,
            }],
            stdin: StdinSource::Literal("piped text".to_owned()),
            ..Default::default()
        };
        let result = RealRunner.run(&pipeline, true).unwrap();
        assert_eq!(result.stdout, "piped text");
    }
}
