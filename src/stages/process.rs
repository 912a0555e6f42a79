//! Subprocess stage: pipe tokens through an external command.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::connector::Connector;
use crate::error::{PipelineError, Result};
use crate::stage::{Input, StageDescriptor, Step, wrap};

const RUN: StageDescriptor = StageDescriptor::composable("run", &["program", "args", "options"]);

/// How the child of [`run_with`] is started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Send the child's stderr into the same pipe as its stdout. Otherwise
    /// stderr is inherited from this process.
    pub merge_stderr: bool,
    /// Working directory of the child; this process's when unset.
    pub cwd: Option<PathBuf>,
    /// Variables added to (or overriding) the inherited environment.
    pub env: Vec<(String, String)>,
}

impl RunOptions {
    pub fn with_merged_stderr(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    pub fn with_cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

struct Running {
    child: Child,
    stdout: BufReader<Box<dyn Read + Send>>,
    feeder: Option<JoinHandle<io::Result<()>>>,
}

struct RunStep {
    program: String,
    args: Vec<String>,
    options: RunOptions,
    running: Option<Running>,
    finished: bool,
    line: String,
}

impl RunStep {
    fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Spawn the child. Upstream tokens, when there is an upstream, are
    /// collected and written to its stdin from a helper thread so that a child
    /// producing output before reading all input cannot deadlock us.
    fn spawn(&self, input: &mut Input<'_, String>) -> Result<Running> {
        let stdin_data = if input.is_bound() {
            let mut data = String::new();
            for token in input.by_ref() {
                data.push_str(&token?);
                data.push('\n');
            }
            Some(data)
        } else {
            None
        };

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .envs(self.options.env.iter().map(|(key, value)| (key, value)));
        if let Some(dir) = &self.options.cwd {
            command.current_dir(dir);
        }
        let spawn_error = |source: io::Error| PipelineError::Spawn {
            command: self.command_line(),
            source,
        };
        let merged = if self.options.merge_stderr {
            let (reader, writer) = io::pipe().map_err(spawn_error)?;
            command
                .stdout(writer.try_clone().map_err(spawn_error)?)
                .stderr(writer);
            Some(reader)
        } else {
            command.stdout(Stdio::piped());
            None
        };
        let mut child = command.spawn().map_err(spawn_error)?;
        // Our copies of the pipe's write end must go, or EOF never arrives.
        drop(command);
        debug!(command = %self.command_line(), pid = child.id(), "spawned");

        let feeder = match (stdin_data, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => Some(thread::spawn(move || stdin.write_all(data.as_bytes()))),
            _ => None,
        };
        let stdout: Box<dyn Read + Send> = match merged {
            Some(reader) => Box::new(reader),
            None => Box::new(child.stdout.take().ok_or_else(|| {
                PipelineError::stage(RUN.name, "child stdout was not captured")
            })?),
        };
        Ok(Running {
            child,
            stdout: BufReader::new(stdout),
            feeder,
        })
    }

    /// Reap a child whose output is exhausted and report a failing status.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        join_feeder(running.feeder.take());
        let status = running.child.wait()?;
        debug!(command = %self.command_line(), %status, "exited");
        if status.success() {
            Ok(())
        } else {
            Err(PipelineError::CommandFailed {
                command: self.command_line(),
                status,
            })
        }
    }
}

/// A child that stops reading early makes the feeder hit a broken pipe.
fn join_feeder(feeder: Option<JoinHandle<io::Result<()>>>) {
    let Some(feeder) = feeder else { return };
    match feeder.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {}
        Ok(Err(err)) => warn!(error = %err, "writing to child stdin failed"),
        Err(_) => warn!("stdin feeder thread panicked"),
    }
}

impl Step<String> for RunStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, String>) -> Option<Result<String>> {
        if self.finished {
            return None;
        }
        if self.running.is_none() {
            match self.spawn(input) {
                Ok(running) => self.running = Some(running),
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }

        self.line.clear();
        let read = self.running.as_mut()?.stdout.read_line(&mut self.line);
        match read {
            Ok(0) => self.finish().err().map(Err),
            Ok(_) => {
                let line = self.line.strip_suffix('\n').unwrap_or(&self.line);
                Some(Ok(line.strip_suffix('\r').unwrap_or(line).to_string()))
            }
            Err(err) => Some(Err(err.into())),
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        self.finished = true;
        if let Err(err) = running.child.kill() {
            // Already exited on its own.
            if err.kind() != io::ErrorKind::InvalidInput {
                return Err(err.into());
            }
        }
        drop(running.stdout);
        running.child.wait()?;
        join_feeder(running.feeder.take());
        debug!(command = %self.command_line(), "killed");
        Ok(())
    }
}

/// Run `program` with `args`. When the stage has an upstream, its tokens are
/// written to the child's stdin one per line; the child's stdout lines are the
/// stage's output. Closing the chain early kills the child.
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Connector<String, String> {
    run_with(program, args, RunOptions::default())
}

/// [`run`] with a working directory, extra environment or merged stderr.
pub fn run_with<S: AsRef<str>>(program: &str, args: &[S], options: RunOptions) -> Connector<String, String> {
    let args: Vec<String> = args.iter().map(|arg| arg.as_ref().to_string()).collect();
    wrap(RUN, |(program, args, options): (String, Vec<String>, RunOptions)| {
        Ok(RunStep {
            program,
            args,
            options,
            running: None,
            finished: false,
            line: String::new(),
        })
    })
    .call((program.to_string(), args, options))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipe::Pipe;
    use crate::stages::{aslist, count, first};
    use crate::stream::source;

    const NO_ARGS: &[&str] = &[];

    #[test]
    fn test_run_without_upstream() {
        let lines = run("printf", &["a\\nb\\n"]).pipe(aslist()).unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_run_feeds_stdin() {
        let lines = source(vec!["x".to_string(), "y".to_string()])
            .pipe(run("cat", NO_ARGS))
            .unwrap()
            .pipe(aslist())
            .unwrap();
        assert_eq!(lines, vec!["x", "y"]);
    }

    #[test]
    fn test_early_close_kills_child() {
        let line = run("yes", NO_ARGS).pipe(first()).unwrap();
        assert_eq!(line.as_deref(), Some("y"));
    }

    #[test]
    fn test_failing_status_is_an_error() {
        let err = run("sh", &["-c", "echo out; exit 3"]).pipe(count()).unwrap_err();
        assert!(matches!(err, PipelineError::CommandFailed { .. }), "got: {err}");
    }

    #[test]
    fn test_merged_stderr() {
        let script = &["-c", "echo out; echo err 1>&2"];
        let lines = run_with("sh", script, RunOptions::default().with_merged_stderr())
            .pipe(aslist())
            .unwrap();
        assert_eq!(lines, vec!["out", "err"]);

        let lines = run("sh", script).pipe(aslist()).unwrap();
        assert_eq!(lines, vec!["out"]);
    }

    #[test]
    fn test_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions::default().with_cwd(dir.path());
        let lines = run_with("pwd", NO_ARGS, options).pipe(aslist()).unwrap();
        assert_eq!(
            std::fs::canonicalize(&lines[0]).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn test_env_extends_inherited() {
        let options = RunOptions::default().with_env("LAZY_PIPES_GREETING", "hello");
        let script = "echo $LAZY_PIPES_GREETING; test -n \"$PATH\" && echo path";
        let lines = run_with("sh", &["-c", script], options).pipe(aslist()).unwrap();
        assert_eq!(lines, vec!["hello", "path"]);
    }

    #[test]
    fn test_missing_cwd_fails_to_spawn() {
        let options = RunOptions::default().with_cwd("/definitely/not/here");
        let err = run_with("pwd", NO_ARGS, options).pipe(count()).unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }), "got: {err}");
    }

    #[test]
    fn test_missing_program() {
        let err = run("definitely-not-a-program", NO_ARGS).pipe(count()).unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}
