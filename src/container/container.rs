//! A function's runtime container, viewed through immutable snapshots.

use crate::color::Color;
use crate::container::docker::{self, Architecture, RunOptions, DOCKER};
use crate::container::logs::{line_label, ContainerLogs, LogExit, LogOptions, LogStream};
use crate::container::state::{parse_inspect, InspectState};
use crate::error::{GatewayError, Result};
use crate::process::{command_line, free_port, CommandRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How a function's container is run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub container_name: String,
    /// Host port for the runtime; 0 picks a free one at start.
    pub port: u16,
    pub env_file: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Extra `docker run` flags.
    pub docker_args: Option<String>,
    pub arch: Architecture,
    /// Function binary on the host.
    pub artifact: PathBuf,
}

/// Per-start overrides applied on top of [`ContainerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub artifact: Option<PathBuf>,
    pub arch: Option<Architecture>,
    pub port: Option<u16>,
}

/// Snapshot of one function's container.
///
/// A `Container` never changes after construction. Operations that affect
/// the real container return a fresh snapshot re-read from docker.
#[derive(Clone)]
pub struct Container {
    function_name: String,
    config: ContainerConfig,
    state: Option<InspectState>,
    runner: Arc<dyn CommandRunner>,
    lifecycle: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("function_name", &self.function_name)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Inspect the container backing `function_name`.
    ///
    /// Fails only when docker cannot be run or prints something that is not
    /// an inspection document. A missing container yields an empty snapshot.
    pub async fn get(
        function_name: impl Into<String>,
        config: ContainerConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        Self::inspect(function_name.into(), config, runner, Arc::new(Mutex::new(()))).await
    }

    pub(crate) async fn inspect(
        function_name: String,
        config: ContainerConfig,
        runner: Arc<dyn CommandRunner>,
        lifecycle: Arc<Mutex<()>>,
    ) -> Result<Self> {
        let name = config.container_name.clone();
        // `docker inspect` exits 1 and prints `[]` for unknown names.
        let output = runner
            .output(DOCKER, &docker::inspect_args(&name))
            .await
            .map_err(|source| GatewayError::Inspection {
                name: name.clone(),
                source,
            })?;
        let state = parse_inspect(&output.stdout)
            .map_err(|source| GatewayError::InspectionFormat { name, source })?;

        Ok(Self {
            function_name,
            config,
            state,
            runner,
            lifecycle,
        })
    }

    /// Re-read the container's state.
    pub async fn refresh(&self) -> Result<Self> {
        Self::inspect(
            self.function_name.clone(),
            self.config.clone(),
            self.runner.clone(),
            self.lifecycle.clone(),
        )
        .await
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&InspectState> {
        self.state.as_ref()
    }

    /// Docker's name for the container, or the configured one.
    pub fn name(&self) -> &str {
        self.state
            .as_ref()
            .and_then(InspectState::name)
            .unwrap_or(self.config.container_name.as_str())
    }

    pub fn exists(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state.as_ref().is_some_and(InspectState::is_running)
    }

    pub fn status(&self) -> Option<&str> {
        self.state.as_ref().and_then(InspectState::status)
    }

    /// Host ports bound to `<container_port>/tcp`.
    pub fn host_ports_to(&self, container_port: u16) -> Vec<u16> {
        self.state
            .as_ref()
            .map(|s| s.host_ports_to(container_port))
            .unwrap_or_default()
    }

    /// Start the container unless it is already running.
    pub async fn start(&self, options: &StartOptions) -> Result<Self> {
        if self.is_running() {
            debug!("Container '{}' is already running", self.name());
            return Ok(self.clone());
        }

        // Another task may have started it since this snapshot was taken.
        let _guard = self.lifecycle.lock().await;
        let current = self.refresh().await?;
        if current.is_running() {
            return Ok(current);
        }

        let port = match options.port.unwrap_or(self.config.port) {
            0 => free_port().await?,
            port => port,
        };
        let artifact = options
            .artifact
            .as_deref()
            .unwrap_or(self.config.artifact.as_path());

        let args = docker::run_args(&RunOptions {
            name: &self.config.container_name,
            artifact,
            host_port: port,
            env: &self.config.env,
            env_file: self.config.env_file.as_deref(),
            docker_args: self.config.docker_args.as_deref(),
            arch: options.arch.unwrap_or(self.config.arch),
        })?;

        self.run_docker(&args).await?;
        info!(
            "Started container '{}' for function '{}' on port {}",
            self.config.container_name, self.function_name, port
        );
        self.refresh().await
    }

    /// Stop the container if it is running.
    pub async fn stop(&self) -> Result<Self> {
        if !self.is_running() {
            debug!("Container '{}' is not running", self.name());
            return Ok(self.clone());
        }

        let _guard = self.lifecycle.lock().await;
        let current = self.refresh().await?;
        if !current.is_running() {
            return Ok(current);
        }

        self.run_docker(&docker::stop_args(&self.config.container_name))
            .await?;
        info!(
            "Stopped container '{}' for function '{}'",
            self.config.container_name, self.function_name
        );
        self.refresh().await
    }

    async fn run_docker(&self, args: &[String]) -> Result<()> {
        let command = command_line(DOCKER, args);
        self.runner
            .output(DOCKER, args)
            .await
            .map_err(|source| GatewayError::Spawn {
                command: command.clone(),
                source,
            })?
            .into_result(&command)?;
        Ok(())
    }

    /// Open the container's log output, one labelled stream per pipe.
    pub fn log_streams(&self, options: &LogOptions) -> Result<ContainerLogs> {
        let args = docker::logs_args(&self.config.container_name, options.watch);
        let command = command_line(DOCKER, &args);
        let process = self
            .runner
            .spawn_streams(DOCKER, &args, options.all)
            .map_err(|source| GatewayError::Spawn {
                command: command.clone(),
                source,
            })?;

        let label = line_label(&self.function_name, options);
        Ok(ContainerLogs {
            streams: process
                .streams
                .into_iter()
                .map(|reader| LogStream::new(reader, label.clone()))
                .collect(),
            exit: LogExit::new(command, process.exit),
        })
    }

    /// Status text colored by lifecycle phase.
    pub fn display_status(&self) -> String {
        match self.status() {
            Some(status) => status_color(status).paint(status),
            None => "not exist".to_string(),
        }
    }

    /// Row for the FUNCTION / CONTAINER NAME / STATUS / PORTS table.
    pub fn table_row(&self, colored: bool) -> [String; 4] {
        if !self.exists() {
            return [
                self.function_name.clone(),
                String::new(),
                "not exist".to_string(),
                String::new(),
            ];
        }

        let status = if colored {
            self.display_status()
        } else {
            self.status().unwrap_or_default().to_string()
        };

        [
            self.function_name.clone(),
            self.name().to_string(),
            status,
            self.port_summary(),
        ]
    }

    /// `hostIp:hostPort -> containerPort` for every binding.
    pub fn port_summary(&self) -> String {
        let Some(state) = self.state.as_ref() else {
            return String::new();
        };
        state
            .ports()
            .flat_map(|(container_port, bindings)| {
                bindings.iter().map(move |b| {
                    format!(
                        "{}:{} -> {}",
                        b.host_ip.as_deref().unwrap_or_default(),
                        b.host_port.as_deref().unwrap_or_default(),
                        container_port
                    )
                })
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Color for a docker status string.
pub fn status_color(status: &str) -> Color {
    match status {
        "created" | "restarting" => Color::Yellow,
        "running" => Color::Green,
        "paused" => Color::Cyan,
        "removing" | "exited" | "exit" | "dead" => Color::Red,
        _ => Color::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, OutputStream, StreamingProcess};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Answers inspections from a queue and records every invocation.
    #[derive(Default)]
    struct FakeRunner {
        inspections: StdMutex<Vec<String>>,
        calls: StdMutex<Vec<Vec<String>>>,
        logs_exit_code: i32,
    }

    impl FakeRunner {
        fn with_inspections(outputs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                inspections: StdMutex::new(outputs.iter().rev().map(|s| s.to_string()).collect()),
                calls: StdMutex::new(Vec::new()),
                logs_exit_code: 0,
            })
        }

        fn calls_of(&self, subcommand: &str) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|args| args[0] == subcommand)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn output(&self, _program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            if args[0] == "inspect" {
                let next = self.inspections.lock().unwrap().pop().unwrap_or_default();
                return Ok(CommandOutput::ok(next));
            }
            Ok(CommandOutput::ok("container-id\n"))
        }

        fn spawn_streams(
            &self,
            _program: &str,
            args: &[String],
            include_stderr: bool,
        ) -> std::io::Result<StreamingProcess> {
            self.calls.lock().unwrap().push(args.to_vec());
            let mut streams: Vec<OutputStream> =
                vec![Box::new(std::io::Cursor::new(b"started\n".to_vec()))];
            if include_stderr {
                streams.push(Box::new(std::io::Cursor::new(b"warning\n".to_vec())));
            }
            let code = self.logs_exit_code;
            Ok(StreamingProcess {
                streams,
                exit: Box::pin(async move {
                    Ok::<_, std::io::Error>(CommandOutput {
                        code: Some(code),
                        stdout: String::new(),
                        stderr: if code == 0 {
                            String::new()
                        } else {
                            "Error: No such container: svc_hello".to_string()
                        },
                    })
                }),
            })
        }
    }

    const RUNNING: &str = r#"[{"Name":"/svc_hello","State":{"Status":"running","Running":true},
        "NetworkSettings":{"Ports":{"8080/tcp":[{"HostIp":"0.0.0.0","HostPort":"9000"}]}}}]"#;
    const EXITED: &str = r#"[{"Name":"/svc_hello","State":{"Status":"exited","Running":false}}]"#;

    fn config() -> ContainerConfig {
        ContainerConfig {
            container_name: "svc_hello".to_string(),
            port: 9000,
            artifact: PathBuf::from("/work/target/lambda/hello/bootstrap"),
            ..ContainerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_get_missing_container() {
        let runner = FakeRunner::with_inspections(&["[]"]);
        let container = Container::get("hello", config(), runner.clone()).await.unwrap();

        assert!(!container.exists());
        assert!(!container.is_running());
        assert_eq!(container.name(), "svc_hello");
        assert_eq!(container.display_status(), "not exist");
        assert_eq!(runner.calls_of("inspect"), vec![vec!["inspect", "svc_hello"]]);
    }

    #[tokio::test]
    async fn test_get_reports_inspection_spawn_failure() {
        struct Broken;

        #[async_trait]
        impl CommandRunner for Broken {
            async fn output(&self, _: &str, _: &[String]) -> std::io::Result<CommandOutput> {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "docker"))
            }

            fn spawn_streams(&self, _: &str, _: &[String], _: bool) -> std::io::Result<StreamingProcess> {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "docker"))
            }
        }

        let result = Container::get("hello", config(), Arc::new(Broken)).await;
        assert!(matches!(result, Err(GatewayError::Inspection { .. })));
    }

    #[tokio::test]
    async fn test_start_runs_once_then_is_idempotent() {
        let runner = FakeRunner::with_inspections(&["[]", "[]", RUNNING]);
        let container = Container::get("hello", config(), runner.clone()).await.unwrap();

        let started = container.start(&StartOptions::default()).await.unwrap();
        assert!(started.is_running());
        assert_eq!(started.host_ports_to(8080), vec![9000]);

        let again = started.start(&StartOptions::default()).await.unwrap();
        assert!(again.is_running());

        let runs = runner.calls_of("run");
        assert_eq!(runs.len(), 1);
        assert!(runs[0].contains(&"9000:8080".to_string()));
        assert_eq!(runs[0].last().map(String::as_str), Some("bootstrap"));
    }

    #[tokio::test]
    async fn test_start_from_stale_snapshot_does_not_run_twice() {
        let runner = FakeRunner::with_inspections(&["[]", RUNNING]);
        let stale = Container::get("hello", config(), runner.clone()).await.unwrap();

        let current = stale.start(&StartOptions::default()).await.unwrap();
        assert!(current.is_running());
        assert!(runner.calls_of("run").is_empty());
    }

    #[tokio::test]
    async fn test_start_allocates_port_when_zero() {
        let runner = FakeRunner::with_inspections(&["[]", "[]", RUNNING]);
        let config = ContainerConfig {
            port: 0,
            ..config()
        };
        let container = Container::get("hello", config, runner.clone()).await.unwrap();
        container.start(&StartOptions::default()).await.unwrap();

        let run = &runner.calls_of("run")[0];
        let mapping = run.iter().find(|a| a.ends_with(":8080")).unwrap();
        let host_port: u16 = mapping.trim_end_matches(":8080").parse().unwrap();
        assert_ne!(host_port, 0);
    }

    #[tokio::test]
    async fn test_start_applies_overrides() {
        let runner = FakeRunner::with_inspections(&["[]", "[]", RUNNING]);
        let container = Container::get("hello", config(), runner.clone()).await.unwrap();
        let options = StartOptions {
            artifact: Some(PathBuf::from("/other/dir/handler")),
            arch: Some(Architecture::Arm64),
            port: Some(9100),
        };
        container.start(&options).await.unwrap();

        let run = &runner.calls_of("run")[0];
        assert!(run.contains(&"/other/dir:/var/runtime".to_string()));
        assert!(run.contains(&"linux/arm64/v8".to_string()));
        assert!(run.contains(&"9100:8080".to_string()));
    }

    #[tokio::test]
    async fn test_stop_only_when_running() {
        let runner = FakeRunner::with_inspections(&[EXITED]);
        let container = Container::get("hello", config(), runner.clone()).await.unwrap();
        let same = container.stop().await.unwrap();
        assert_eq!(same.status(), Some("exited"));
        assert!(runner.calls_of("stop").is_empty());

        let runner = FakeRunner::with_inspections(&[RUNNING, RUNNING, "[]"]);
        let container = Container::get("hello", config(), runner.clone()).await.unwrap();
        let stopped = container.stop().await.unwrap();
        assert!(!stopped.exists());
        assert_eq!(runner.calls_of("stop"), vec![vec!["stop", "svc_hello"]]);
    }

    #[tokio::test]
    async fn test_log_streams() {
        let runner = FakeRunner::with_inspections(&[RUNNING]);
        let container = Container::get("hello", config(), runner.clone()).await.unwrap();

        let options = LogOptions {
            prefix_size: 6,
            all: true,
            watch: true,
            ..LogOptions::default()
        };
        let logs = container.log_streams(&options).unwrap();
        assert_eq!(logs.streams.len(), 2);
        assert_eq!(
            runner.calls_of("logs"),
            vec![vec!["logs", "--follow", "svc_hello"]]
        );

        let mut out = Vec::new();
        for stream in logs.streams {
            stream.pipe_to(&mut out).await.unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "hello | started\nhello | warning\n"
        );
        assert!(logs.exit.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_log_streams_surface_failed_logs_process() {
        let runner = Arc::new(FakeRunner {
            inspections: StdMutex::new(vec![RUNNING.to_string()]),
            calls: StdMutex::new(Vec::new()),
            logs_exit_code: 1,
        });
        let container = Container::get("hello", config(), runner).await.unwrap();

        let logs = container.log_streams(&LogOptions::default()).unwrap();
        assert_eq!(logs.streams.len(), 1);
        match logs.exit.wait().await {
            Err(GatewayError::CommandFailed { command, code, stderr }) => {
                assert_eq!(command, "docker logs svc_hello");
                assert_eq!(code, Some(1));
                assert!(stderr.contains("No such container"));
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_table_row() {
        let runner = FakeRunner::with_inspections(&[RUNNING]);
        let container = Container::get("hello", config(), runner).await.unwrap();
        assert_eq!(
            container.table_row(false),
            [
                "hello".to_string(),
                "svc_hello".to_string(),
                "running".to_string(),
                "0.0.0.0:9000 -> 8080/tcp".to_string(),
            ]
        );
        assert_eq!(container.table_row(true)[2], "\u{1b}[32mrunning\u{1b}[39m");
    }

    #[test]
    fn test_status_color() {
        assert_eq!(status_color("created"), Color::Yellow);
        assert_eq!(status_color("restarting"), Color::Yellow);
        assert_eq!(status_color("running"), Color::Green);
        assert_eq!(status_color("paused"), Color::Cyan);
        assert_eq!(status_color("exited"), Color::Red);
        assert_eq!(status_color("dead"), Color::Red);
        assert_eq!(status_color("removing"), Color::Red);
        assert_eq!(status_color("unknown"), Color::Default);
    }
}
